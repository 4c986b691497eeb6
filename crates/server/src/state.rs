// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use metafile_core::TaskRegistry;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Metafile creation tasks.
    pub registry: Arc<TaskRegistry>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(registry: Arc<TaskRegistry>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            registry,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
