//! API route handlers for the metafile server.

pub mod health;
pub mod tasks;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health - Health check
/// - POST   /api/tasks - Create a metafile creation task
/// - GET    /api/tasks - Status of all tasks
/// - GET    /api/tasks/{id} - Status of one task
/// - DELETE /api/tasks/{id} - Delete a task
/// - GET    /api/tasks/{id}/file - Download the finished metafile
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router().merge(tasks::router()))
        .with_state(state)
}
