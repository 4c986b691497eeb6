// crates/server/src/lib.rs
//! Metafile server library.
//!
//! Axum HTTP front end for the metafile creation task registry: create
//! tasks, poll their status, download finished `.torrent` files and delete
//! tasks.

pub mod error;
pub mod routes;
pub mod state;

pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use metafile_core::TaskRegistry;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, tasks)
/// - CORS (allows any origin)
/// - Request tracing
pub fn create_app(registry: Arc<TaskRegistry>) -> Router {
    let state = AppState::new(registry);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
