// crates/core/src/params.rs
//! Parameters describing the metafile a task should produce.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a creation task should build.
///
/// Immutable after creation except for `piece_size`, which is back-filled
/// with the effective value when the task succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    /// File or directory to describe.
    pub input_path: PathBuf,
    /// Where to write the metafile. `None` keeps the result in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<PathBuf>,
    #[serde(default)]
    pub private: bool,
    /// Piece length in bytes; 0 lets the creator choose.
    #[serde(default)]
    pub piece_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Tracker URLs. An empty entry starts a new tier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trackers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub url_seeds: Vec<String>,
}

impl TaskParams {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            ..Default::default()
        }
    }

    /// Group trackers into announce tiers.
    pub fn tracker_tiers(&self) -> Vec<Vec<String>> {
        let mut tiers: Vec<Vec<String>> = vec![Vec::new()];
        for tracker in &self.trackers {
            let tracker = tracker.trim();
            if tracker.is_empty() {
                if tiers.last().is_some_and(|t| !t.is_empty()) {
                    tiers.push(Vec::new());
                }
            } else if let Some(tier) = tiers.last_mut() {
                tier.push(tracker.to_string());
            }
        }
        tiers.retain(|t| !t.is_empty());
        tiers
    }
}
