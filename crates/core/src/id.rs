// crates/core/src/id.rs
//! Opaque task identifiers.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a registered task.
///
/// Unique among all currently registered tasks. Ids are random v4 UUIDs in
/// their hyphenated form, so reuse after deletion is possible in principle
/// but never happens in practice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn random() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Allocate an id that `is_taken` does not report as in use, drawing again
/// on collision.
pub fn allocate(is_taken: impl Fn(&str) -> bool) -> TaskId {
    loop {
        let candidate = TaskId::random();
        if !is_taken(candidate.as_str()) {
            return candidate;
        }
        tracing::debug!(id = %candidate, "Task id collision, drawing again");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_is_uuid_shaped() {
        let id = allocate(|_| false);
        assert_eq!(id.as_str().len(), 36);
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_allocate_retries_on_collision() {
        let calls = Cell::new(0);
        let id = allocate(|_| {
            calls.set(calls.get() + 1);
            calls.get() <= 3
        });
        assert_eq!(calls.get(), 4);
        assert!(!id.as_str().is_empty());
    }

    #[test]
    fn test_allocate_avoids_existing() {
        let mut existing: HashSet<TaskId> = HashSet::new();
        for _ in 0..1000 {
            let id = allocate(|candidate| existing.contains(candidate));
            assert!(existing.insert(id));
        }
        assert_eq!(existing.len(), 1000);
    }

    #[test]
    fn test_task_id_serializes_as_string() {
        let id = TaskId::from("1234");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1234\"");
    }
}
