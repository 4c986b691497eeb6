// crates/core/src/task.rs
//! Observable state of a single creation job.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::id::TaskId;
use crate::params::TaskParams;
use crate::result::TaskResult;

/// Coarse lifecycle status as reported to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Pending,
    Processing,
    Done,
    Error,
}

/// One tracked job.
///
/// State only moves forward: Pending → Running → Done (success or error).
/// Once done, further events are ignored.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    params: TaskParams,
    progress: u8,
    error_msg: Option<String>,
    result: Option<TaskResult>,
    time_added: DateTime<Utc>,
    time_started: Option<DateTime<Utc>>,
    time_done: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, params: TaskParams) -> Self {
        Self {
            id,
            params,
            progress: 0,
            error_msg: None,
            result: None,
            time_added: Utc::now(),
            time_started: None,
            time_done: None,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn params(&self) -> &TaskParams {
        &self.params
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn time_added(&self) -> DateTime<Utc> {
        self.time_added
    }

    pub fn time_started(&self) -> Option<DateTime<Utc>> {
        self.time_started
    }

    pub fn time_done(&self) -> Option<DateTime<Utc>> {
        self.time_done
    }

    pub fn is_started(&self) -> bool {
        self.time_started.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.time_done.is_some()
    }

    /// The failure message, if the job reported a non-empty one.
    pub fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref().filter(|m| !m.is_empty())
    }

    /// Record progress. Values above 100 are clamped and progress never
    /// moves backwards. Returns false if the task is already done.
    pub fn report_progress(&mut self, progress: u8) -> bool {
        if self.is_done() {
            return false;
        }
        self.mark_started();
        self.progress = self.progress.max(progress.min(100));
        true
    }

    /// Record success and back-fill the effective piece size.
    /// Returns false (and changes nothing) if the task is already done.
    pub fn report_success(&mut self, result: TaskResult) -> bool {
        if self.is_done() {
            return false;
        }
        self.mark_started();
        self.params.piece_size = result.piece_size;
        self.result = Some(result);
        self.time_done = Some(Utc::now());
        true
    }

    /// Record failure. Returns false if the task is already done.
    pub fn report_failure(&mut self, message: impl Into<String>) -> bool {
        if self.is_done() {
            return false;
        }
        self.mark_started();
        self.error_msg = Some(message.into());
        self.time_done = Some(Utc::now());
        true
    }

    pub fn is_done_with_success(&self) -> bool {
        self.is_done()
            && self.error_msg().is_none()
            && self.result.as_ref().is_some_and(TaskResult::is_usable)
    }

    /// Done without a usable result counts as an error, message or not.
    pub fn is_done_with_error(&self) -> bool {
        self.is_done() && !self.is_done_with_success()
    }

    pub fn is_running(&self) -> bool {
        self.is_started() && !self.is_done()
    }

    pub fn status(&self) -> TaskStatus {
        if self.is_done_with_error() {
            TaskStatus::Error
        } else if self.is_done_with_success() {
            TaskStatus::Done
        } else if self.is_running() {
            TaskStatus::Processing
        } else {
            TaskStatus::Pending
        }
    }

    fn mark_started(&mut self) {
        if self.time_started.is_none() {
            self.time_started = Some(Utc::now());
        }
    }
}
