// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

use crate::id::TaskId;

/// Errors returned by [`TaskRegistry`](crate::TaskRegistry) operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task registry is full ({max_tasks} tasks, none completed)")]
    Full { max_tasks: usize },

    #[error("Task registry has been shut down")]
    ShutDown,

    #[error("A task registry is already installed for this process")]
    AlreadyInstalled,

    #[error("Task registry requires a Tokio runtime")]
    NoRuntime,
}

/// Errors that can occur when resolving a finished task's metafile.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Task has not finished successfully")]
    NotReady,

    #[error("Cannot read task result from {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a unit of work.
///
/// `aborted` is set when the job stopped because its cancellation token fired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    pub aborted: bool,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            aborted: false,
        }
    }

    pub fn aborted() -> Self {
        Self {
            message: "Operation aborted".to_string(),
            aborted: true,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::new(format!("{} not found", path.display())),
            std::io::ErrorKind::PermissionDenied => {
                Self::new(format!("permission denied: {}", path.display()))
            }
            _ => Self::new(format!("{}: {}", path.display(), source)),
        }
    }
}
