// crates/core/src/worker.rs
//! Bridge between a unit of work running on the worker pool and the task
//! table that tracks it.
//!
//! Events never touch a `Task` directly. Each one carries only the task id
//! and is resolved through the registry at delivery time, so an event for a
//! task that was deleted in the meantime finds nothing and is dropped.

use std::sync::{Arc, Weak};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::id::TaskId;
use crate::params::TaskParams;
use crate::result::TaskResult;

/// A job the registry can run: given parameters, produce a result.
///
/// Runs on a blocking worker thread. Implementations report progress through
/// the [`JobContext`] and should poll [`JobContext::check_cancelled`] at a
/// bounded granularity (e.g. between pieces).
pub trait UnitOfWork: Send + Sync + 'static {
    fn run(&self, params: &TaskParams, ctx: &mut JobContext) -> Result<TaskResult, JobError>;
}

impl<F> UnitOfWork for F
where
    F: Fn(&TaskParams, &mut JobContext) -> Result<TaskResult, JobError> + Send + Sync + 'static,
{
    fn run(&self, params: &TaskParams, ctx: &mut JobContext) -> Result<TaskResult, JobError> {
        self(params, ctx)
    }
}

/// Event emitted by a job for its task.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Progress(u8),
    Success(TaskResult),
    Failure(String),
}

/// Receiver of task events, keyed by id. Implemented by the registry table.
pub(crate) trait EventSink: Send + Sync {
    fn deliver(&self, id: &TaskId, event: TaskEvent);
}

/// Handed to a running [`UnitOfWork`].
pub struct JobContext {
    id: TaskId,
    sink: Weak<dyn EventSink>,
    cancel: CancellationToken,
    last_progress: Option<u8>,
}

impl JobContext {
    pub fn task_id(&self) -> &TaskId {
        &self.id
    }

    /// Report progress in percent. Repeated values are not re-delivered.
    pub fn progress(&mut self, percent: u8) {
        if self.last_progress == Some(percent) {
            return;
        }
        self.last_progress = Some(percent);
        deliver(&self.sink, &self.id, TaskEvent::Progress(percent));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::aborted())
        } else {
            Ok(())
        }
    }

    /// Context whose events go nowhere, for driving a unit of work directly.
    #[cfg(test)]
    pub(crate) fn detached(cancel: CancellationToken) -> Self {
        struct Discard;
        impl EventSink for Discard {
            fn deliver(&self, _: &TaskId, _: TaskEvent) {}
        }
        Self::with_sink(Weak::<Discard>::new(), cancel)
    }

    #[cfg(test)]
    pub(crate) fn with_sink(sink: Weak<dyn EventSink>, cancel: CancellationToken) -> Self {
        Self {
            id: TaskId::from("detached"),
            sink,
            cancel,
            last_progress: None,
        }
    }
}

fn deliver(sink: &Weak<dyn EventSink>, id: &TaskId, event: TaskEvent) {
    match sink.upgrade() {
        Some(sink) => sink.deliver(id, event),
        None => tracing::trace!(task_id = %id, "Registry gone, dropping event"),
    }
}

/// Wraps one submission of a unit of work.
///
/// Guarantees exactly one terminal event per job: the unit's return value
/// becomes the success or failure event, and a panic becomes a failure.
pub(crate) struct WorkerAdapter {
    id: TaskId,
    params: TaskParams,
    unit: Arc<dyn UnitOfWork>,
    sink: Weak<dyn EventSink>,
    cancel: CancellationToken,
}

impl WorkerAdapter {
    pub(crate) fn new(
        id: TaskId,
        params: TaskParams,
        unit: Arc<dyn UnitOfWork>,
        sink: Weak<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            params,
            unit,
            sink,
            cancel,
        }
    }

    /// Wait for a pool slot, then run the job on a blocking thread.
    pub(crate) async fn execute(self, pool: Arc<Semaphore>) {
        let _permit = match pool.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(task_id = %self.id, "Worker pool closed before job started");
                return;
            }
        };

        if self.cancel.is_cancelled() {
            tracing::debug!(task_id = %self.id, "Job cancelled while queued");
            deliver(&self.sink, &self.id, TaskEvent::Failure(JobError::aborted().message));
            return;
        }

        let id = self.id.clone();
        let sink = self.sink.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || self.run()).await {
            tracing::warn!(task_id = %id, error = %e, "Worker thread panicked");
            deliver(&sink, &id, TaskEvent::Failure(format!("Worker panicked: {e}")));
        }
    }

    fn run(self) {
        let mut ctx = JobContext {
            id: self.id.clone(),
            sink: self.sink.clone(),
            cancel: self.cancel.clone(),
            last_progress: None,
        };

        let event = match self.unit.run(&self.params, &mut ctx) {
            Ok(result) => TaskEvent::Success(result),
            Err(e) => {
                if e.aborted {
                    tracing::debug!(task_id = %self.id, "Job observed cancellation");
                }
                TaskEvent::Failure(e.message)
            }
        };
        deliver(&self.sink, &self.id, event);
    }
}
