// crates/core/src/result.rs
//! Task results and access to the produced metafile.

use std::path::PathBuf;

use bytes::Bytes;

use crate::error::ContentError;
use crate::task::Task;

/// Where a successful job left its metafile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    InMemory(Bytes),
    File(PathBuf),
}

/// Produced exactly once, when a job succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub payload: Payload,
    /// Piece length the job actually used.
    pub piece_size: u32,
}

impl TaskResult {
    pub fn in_memory(content: impl Into<Bytes>, piece_size: u32) -> Self {
        Self {
            payload: Payload::InMemory(content.into()),
            piece_size,
        }
    }

    pub fn file(path: impl Into<PathBuf>, piece_size: u32) -> Self {
        Self {
            payload: Payload::File(path.into()),
            piece_size,
        }
    }

    /// An empty buffer or an empty path is not something a caller can fetch.
    pub fn is_usable(&self) -> bool {
        match &self.payload {
            Payload::InMemory(content) => !content.is_empty(),
            Payload::File(path) => !path.as_os_str().is_empty(),
        }
    }
}

/// Resolve a task's metafile, reading it from disk when it was written there.
pub async fn read_content(task: &Task) -> Result<Bytes, ContentError> {
    let result = match task.result() {
        Some(result) if task.is_done_with_success() => result,
        _ => return Err(ContentError::NotReady),
    };

    match &result.payload {
        Payload::InMemory(content) => Ok(content.clone()),
        Payload::File(path) => tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|source| ContentError::Unreadable {
                path: path.clone(),
                source,
            }),
    }
}

/// Like [`read_content`], but every failure collapses into an empty buffer.
pub async fn content(task: &Task) -> Bytes {
    match read_content(task).await {
        Ok(content) => content,
        Err(ContentError::NotReady) => Bytes::new(),
        Err(e) => {
            tracing::warn!(task_id = %task.id(), error = %e, "Task result unreadable");
            Bytes::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TaskId;
    use crate::params::TaskParams;

    fn task() -> Task {
        Task::new(TaskId::from("t1"), TaskParams::new("/data"))
    }

    #[test]
    fn test_usable_payloads() {
        assert!(TaskResult::in_memory(vec![1u8], 16384).is_usable());
        assert!(!TaskResult::in_memory(Vec::<u8>::new(), 16384).is_usable());
        assert!(TaskResult::file("/out.torrent", 16384).is_usable());
        assert!(!TaskResult::file("", 16384).is_usable());
    }

    #[tokio::test]
    async fn test_content_empty_before_success() {
        let mut t = task();
        assert!(content(&t).await.is_empty());
        assert!(matches!(read_content(&t).await, Err(ContentError::NotReady)));

        t.report_progress(40);
        assert!(content(&t).await.is_empty());
    }

    #[tokio::test]
    async fn test_content_empty_after_failure() {
        let mut t = task();
        t.report_failure("input path not found");
        assert!(content(&t).await.is_empty());
    }

    #[tokio::test]
    async fn test_content_in_memory_is_idempotent() {
        let mut t = task();
        t.report_success(TaskResult::in_memory(&b"d4:infoe"[..], 16384));
        assert_eq!(content(&t).await, Bytes::from_static(b"d4:infoe"));
        assert_eq!(content(&t).await, Bytes::from_static(b"d4:infoe"));
    }

    #[tokio::test]
    async fn test_content_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.torrent");
        std::fs::write(&path, b"d1:ai1ee").unwrap();

        let mut t = task();
        t.report_success(TaskResult::file(&path, 32768));
        assert_eq!(read_content(&t).await.unwrap(), Bytes::from_static(b"d1:ai1ee"));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moved.torrent");

        let mut t = task();
        t.report_success(TaskResult::file(&path, 32768));
        assert!(t.is_done_with_success());

        let err = read_content(&t).await.unwrap_err();
        assert!(matches!(err, ContentError::Unreadable { .. }));
        assert!(content(&t).await.is_empty());
    }
}
