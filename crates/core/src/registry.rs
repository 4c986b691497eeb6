// crates/core/src/registry.rs
//! Process-scoped registry of metafile creation tasks.
//!
//! The registry owns every `Task`. Workers never hold a reference to one;
//! their events carry a task id and are applied here under the table's write
//! lock, which serializes all mutation (insert, erase, state transitions).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::id::{self, TaskId};
use crate::params::TaskParams;
use crate::task::Task;
use crate::worker::{EventSink, TaskEvent, UnitOfWork, WorkerAdapter};

/// Set while an installed registry is alive.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Handle to the process-wide registry returned by [`install`].
pub type RegistryHandle = Arc<TaskRegistry>;

/// Claim the single process-wide registry slot.
///
/// Fails with [`RegistryError::AlreadyInstalled`] while another installed
/// registry is alive. The slot is released by [`TaskRegistry::shutdown`] or
/// when the registry is dropped.
pub fn install(
    config: RegistryConfig,
    worker: impl UnitOfWork,
) -> Result<RegistryHandle, RegistryError> {
    if INSTALLED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(RegistryError::AlreadyInstalled);
    }

    match TaskRegistry::new(config, worker) {
        Ok(mut registry) => {
            registry.installed = true;
            tracing::info!(
                max_tasks = config.max_tasks,
                workers = config.worker_threads(),
                "Task registry installed"
            );
            Ok(Arc::new(registry))
        }
        Err(e) => {
            INSTALLED.store(false, Ordering::Release);
            Err(e)
        }
    }
}

struct Entry {
    task: Task,
    seq: u64,
    // Cancels the job when the entry is destroyed.
    _cancel_on_drop: DropGuard,
}

/// Primary map by id plus a secondary view ordered by (done, insertion).
/// Both are only ever updated together. `closed` lives under the same lock
/// so no insert can land after shutdown has drained the table.
#[derive(Default)]
struct TaskTable {
    by_id: HashMap<TaskId, Entry>,
    by_completion: BTreeSet<(bool, u64, TaskId)>,
    next_seq: u64,
    closed: bool,
}

impl TaskTable {
    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn insert(&mut self, task: Task, cancel: &CancellationToken) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = task.id().clone();
        self.by_completion.insert((task.is_done(), seq, id.clone()));
        self.by_id.insert(
            id,
            Entry {
                task,
                seq,
                _cancel_on_drop: cancel.clone().drop_guard(),
            },
        );
    }

    fn remove(&mut self, id: &str) -> Option<Entry> {
        let entry = self.by_id.remove(id)?;
        self.by_completion
            .remove(&(entry.task.is_done(), entry.seq, entry.task.id().clone()));
        Some(entry)
    }

    /// Apply an event to the task with this id. Returns false if there is no
    /// such task or the task ignored the event.
    fn apply(&mut self, id: &TaskId, event: TaskEvent) -> bool {
        let Some(entry) = self.by_id.get_mut(id.as_str()) else {
            return false;
        };

        let was_done = entry.task.is_done();
        let applied = match event {
            TaskEvent::Progress(p) => entry.task.report_progress(p),
            TaskEvent::Success(result) => entry.task.report_success(result),
            TaskEvent::Failure(message) => entry.task.report_failure(message),
        };

        if !was_done && entry.task.is_done() {
            self.by_completion.remove(&(false, entry.seq, id.clone()));
            self.by_completion.insert((true, entry.seq, id.clone()));
        }
        applied
    }

    /// Remove completed tasks, oldest first, until fewer than `max` remain.
    fn evict_completed(&mut self, max: usize) -> Vec<Entry> {
        let excess = (self.len() + 1).saturating_sub(max);
        let victims: Vec<TaskId> = self
            .by_completion
            .iter()
            .filter(|(done, _, _)| *done)
            .take(excess)
            .map(|(_, _, id)| id.clone())
            .collect();
        victims
            .iter()
            .filter_map(|id| self.remove(id.as_str()))
            .collect()
    }

    fn ordered(&self) -> impl Iterator<Item = &Task> {
        self.by_completion
            .iter()
            .filter_map(|(_, _, id)| self.by_id.get(id.as_str()))
            .map(|entry| &entry.task)
    }
}

struct Shared {
    table: RwLock<TaskTable>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, TaskTable> {
        self.table.read().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned reading task table: {e}");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, TaskTable> {
        self.table.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned writing task table: {e}");
            e.into_inner()
        })
    }
}

impl EventSink for Shared {
    fn deliver(&self, id: &TaskId, event: TaskEvent) {
        let terminal = !matches!(event, TaskEvent::Progress(_));
        let applied = self.write().apply(id, event);
        if applied && terminal {
            tracing::debug!(task_id = %id, "Task finished");
        } else if !applied {
            tracing::trace!(task_id = %id, "Dropping event for unknown or finished task");
        }
    }
}

/// Tracks metafile creation jobs running on a bounded worker pool.
pub struct TaskRegistry {
    shared: Arc<Shared>,
    worker: Arc<dyn UnitOfWork>,
    pool: Arc<Semaphore>,
    runtime: Handle,
    config: RegistryConfig,
    installed: bool,
}

impl TaskRegistry {
    /// Create a registry that runs jobs with `worker`.
    ///
    /// Must be called from within a Tokio runtime; jobs are spawned onto it.
    pub fn new(config: RegistryConfig, worker: impl UnitOfWork) -> Result<Self, RegistryError> {
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;
        Ok(Self {
            shared: Arc::new(Shared {
                table: RwLock::new(TaskTable::default()),
            }),
            worker: Arc::new(worker),
            pool: Arc::new(Semaphore::new(config.worker_threads())),
            runtime,
            config,
            installed: false,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new task and submit its job. Returns without waiting for
    /// the job to start.
    pub fn create_task(&self, params: TaskParams) -> Result<TaskId, RegistryError> {
        let cancel = CancellationToken::new();
        let (id, evicted) = {
            let mut table = self.shared.write();
            if table.closed {
                return Err(RegistryError::ShutDown);
            }
            let evicted = if table.len() >= self.config.max_tasks {
                table.evict_completed(self.config.max_tasks)
            } else {
                Vec::new()
            };
            if table.len() >= self.config.max_tasks {
                return Err(RegistryError::Full {
                    max_tasks: self.config.max_tasks,
                });
            }

            let id = id::allocate(|candidate| table.by_id.contains_key(candidate));
            table.insert(Task::new(id.clone(), params.clone()), &cancel);
            (id, evicted)
        };

        for entry in &evicted {
            tracing::info!(task_id = %entry.task.id(), "Evicted completed task");
        }
        drop(evicted);

        let sink: Weak<dyn EventSink> = Arc::downgrade(&self.shared) as Weak<dyn EventSink>;
        let adapter = WorkerAdapter::new(id.clone(), params, Arc::clone(&self.worker), sink, cancel);
        self.runtime.spawn(adapter.execute(Arc::clone(&self.pool)));

        tracing::info!(task_id = %id, "Task created");
        Ok(id)
    }

    /// Ids of all registered tasks: unfinished tasks first, each group in
    /// creation order.
    pub fn list_ids(&self) -> Vec<TaskId> {
        self.shared
            .read()
            .by_completion
            .iter()
            .map(|(_, _, id)| id.clone())
            .collect()
    }

    /// Snapshot of one task.
    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.shared.read().by_id.get(id).map(|entry| entry.task.clone())
    }

    /// Consistent snapshot of every task, in [`list_ids`](Self::list_ids) order.
    pub fn tasks(&self) -> Vec<Task> {
        self.shared.read().ordered().cloned().collect()
    }

    /// Remove a task and cancel its job. Does not wait for the job to stop.
    pub fn delete_task(&self, id: &str) -> bool {
        let removed = self.shared.write().remove(id);
        match removed {
            Some(entry) => {
                tracing::info!(
                    task_id = %id,
                    running = entry.task.is_running(),
                    "Task deleted"
                );
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.shared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy all tasks, cancelling running jobs without waiting for them,
    /// and refuse new ones. Idempotent.
    pub fn shutdown(&self) {
        let drained = {
            let mut table = self.shared.write();
            if table.closed {
                return;
            }
            table.closed = true;
            table.by_completion.clear();
            std::mem::take(&mut table.by_id)
        };
        self.pool.close();

        let outstanding = drained.len();
        drop(drained);
        tracing::info!(outstanding, "Task registry shut down");

        if self.installed {
            INSTALLED.store(false, Ordering::Release);
        }
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.len())
            .field("config", &self.config)
            .field("closed", &self.shared.read().closed)
            .finish()
    }
}
