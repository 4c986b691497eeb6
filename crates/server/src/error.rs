// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metafile_core::{ContentError, RegistryError};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Registry(registry_err) => {
                let (status, error_msg) = match registry_err {
                    RegistryError::NotFound(id) => {
                        tracing::warn!(task_id = %id, "Task not found");
                        (StatusCode::NOT_FOUND, "Task not found")
                    }
                    RegistryError::Full { max_tasks } => {
                        tracing::warn!(max_tasks = %max_tasks, "Task registry full");
                        (StatusCode::SERVICE_UNAVAILABLE, "Too many tasks")
                    }
                    RegistryError::ShutDown => {
                        tracing::warn!("Task registry shut down");
                        (StatusCode::SERVICE_UNAVAILABLE, "Shutting down")
                    }
                    RegistryError::AlreadyInstalled | RegistryError::NoRuntime => {
                        tracing::error!(error = %registry_err, "Task registry misconfigured");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    }
                };
                (
                    status,
                    ErrorResponse::with_details(error_msg, registry_err.to_string()),
                )
            }
            ApiError::Content(content_err) => {
                let (status, error_msg) = match content_err {
                    ContentError::NotReady => (StatusCode::CONFLICT, "Torrent not ready"),
                    ContentError::Unreadable { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "Task result unreadable");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Torrent file unreadable")
                    }
                };
                (
                    status,
                    ErrorResponse::with_details(error_msg, content_err.to_string()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
