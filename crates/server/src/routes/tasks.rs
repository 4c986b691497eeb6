// crates/server/src/routes/tasks.rs
//! API routes for metafile creation tasks.
//!
//! - POST   /tasks           — Create a task, returns its id
//! - GET    /tasks           — Status of every task
//! - GET    /tasks/{id}      — Status of one task (single-element array)
//! - DELETE /tasks/{id}      — Delete a task, cancelling its job
//! - GET    /tasks/{id}/file — Download the finished metafile

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use metafile_core::{read_content, RegistryError, Task, TaskId, TaskParams, TaskStatus};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const MIN_PIECE_SIZE: u32 = 16 * 1024;
pub const MAX_PIECE_SIZE: u32 = 128 * 1024 * 1024;

/// The only metafile layout the creator produces.
pub const FORMAT_V1: &str = "v1";

/// Body of POST /api/tasks.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub input_path: Option<String>,
    pub save_path: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub piece_size: u32,
    pub comment: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub trackers: Vec<String>,
    #[serde(default)]
    pub url_seeds: Vec<String>,
    pub format: Option<String>,
}

impl CreateTaskRequest {
    pub fn into_params(self) -> ApiResult<TaskParams> {
        let input_path = self
            .input_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::BadRequest("inputPath is required".to_string()))?;

        let piece_size = self.piece_size;
        if piece_size != 0
            && (!piece_size.is_power_of_two()
                || !(MIN_PIECE_SIZE..=MAX_PIECE_SIZE).contains(&piece_size))
        {
            return Err(ApiError::BadRequest(format!(
                "pieceSize must be 0 or a power of two between {MIN_PIECE_SIZE} and {MAX_PIECE_SIZE}, got {piece_size}"
            )));
        }

        if let Some(format) = self.format.as_deref().filter(|f| *f != FORMAT_V1) {
            return Err(ApiError::BadRequest(format!(
                "format must be \"{FORMAT_V1}\", got \"{format}\""
            )));
        }

        Ok(TaskParams {
            input_path: PathBuf::from(input_path),
            save_path: self
                .save_path
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            private: self.private,
            piece_size,
            comment: self.comment.filter(|c| !c.is_empty()),
            source: self.source.filter(|s| !s.is_empty()),
            trackers: self.trackers,
            url_seeds: self.url_seeds,
        })
    }
}

/// Response of POST /api/tasks.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct CreateTaskResponse {
    pub id: String,
}

/// One entry of a status listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusEntry {
    pub id: String,
    pub input_path: String,
    pub private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trackers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub url_seeds: Vec<String>,
    pub format: &'static str,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(rename = "error_msg", skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    pub time_added: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_done: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskStatusEntry {
    fn from(task: &Task) -> Self {
        let params = task.params();
        let status = task.status();
        Self {
            id: task.id().to_string(),
            input_path: params.input_path.display().to_string(),
            private: params.private,
            comment: params.comment.clone(),
            piece_size: (params.piece_size > 0).then_some(params.piece_size),
            save_path: params.save_path.as_ref().map(|p| p.display().to_string()),
            source: params.source.clone(),
            trackers: params.trackers.clone(),
            url_seeds: params.url_seeds.clone(),
            format: FORMAT_V1,
            status,
            progress: (status == TaskStatus::Processing).then_some(task.progress()),
            error_msg: match status {
                TaskStatus::Error => task.error_msg().map(str::to_string),
                _ => None,
            },
            time_added: task.time_added(),
            time_started: task.time_started(),
            time_done: task.time_done(),
        }
    }
}

/// POST /api/tasks — Create a task.
async fn create_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<Json<CreateTaskResponse>> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let params = request.into_params()?;
    let id = state.registry.create_task(params)?;
    Ok(Json(CreateTaskResponse { id: id.to_string() }))
}

/// GET /api/tasks — Status of every task.
async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskStatusEntry>> {
    Json(state.registry.tasks().iter().map(TaskStatusEntry::from).collect())
}

/// GET /api/tasks/{id} — Status of one task.
async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TaskStatusEntry>>> {
    let task = state
        .registry
        .get_task(&id)
        .ok_or_else(|| RegistryError::NotFound(TaskId::from(id.as_str())))?;
    Ok(Json(vec![TaskStatusEntry::from(&task)]))
}

/// DELETE /api/tasks/{id} — Delete a task.
async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.registry.delete_task(&id) {
        Ok(StatusCode::OK)
    } else {
        Err(RegistryError::NotFound(TaskId::from(id)).into())
    }
}

/// GET /api/tasks/{id}/file — Download the metafile of a finished task.
async fn get_task_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .registry
        .get_task(&id)
        .ok_or_else(|| RegistryError::NotFound(TaskId::from(id.as_str())))?;
    let content = read_content(&task).await?;

    let name = task
        .params()
        .input_path
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', "_"))
        .unwrap_or_else(|| task.id().to_string());
    let headers = [
        (header::CONTENT_TYPE, "application/x-bittorrent".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}.torrent\""),
        ),
    ];
    Ok((headers, content))
}

/// Build the tasks router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task).delete(delete_task))
        .route("/tasks/{id}/file", get(get_task_file))
}
