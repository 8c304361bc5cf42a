//! Handlers for the `/tasks` resource.
//!
//! Status changes go through [`TaskService`](relaize_db::TaskService), which
//! enforces the `pending -> processing -> completed | failed | cancelled`
//! state machine; illegal transitions surface as 409.

use std::path::Path as FsPath;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relaize_core::adjustments::AdjustmentPayload;
use relaize_core::error::CoreError;
use relaize_core::naming;
use relaize_core::task::TaskUpdate;
use relaize_core::types::TaskId;

use crate::error::{AppError, AppResult};
use crate::query::TaskListParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/tasks
///
/// Newest first. The status filter applies to the fetched page.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListParams>,
) -> AppResult<impl IntoResponse> {
    let query = params.into_query()?;
    let tasks = state.service.list_tasks(&query).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let task = state.service.get_task(id).await?;
    Ok(Json(DataResponse { data: task }))
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// PATCH /api/tasks/{id}
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    Json(update): Json<TaskUpdate>,
) -> AppResult<impl IntoResponse> {
    let task = state.service.update_task(id, update).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/tasks/{id}/process
///
/// Requeue a finished task. 409 while it is still pending or processing.
pub async fn process_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let task = state.service.enqueue_task(id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/tasks/{id}/adjust
pub async fn adjust_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    Json(payload): Json<AdjustmentPayload>,
) -> AppResult<impl IntoResponse> {
    let task = state.service.apply_adjustments(id, payload).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/tasks/{id}/cancel
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let task = state.service.cancel_task(id).await?;
    Ok(Json(DataResponse { data: task }))
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// GET /api/tasks/{id}/source
pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<Response> {
    let task = state.service.get_task(id).await?;
    let path = state.service.source_path(&task);
    let content_type = task
        .content_type
        .clone()
        .unwrap_or_else(|| naming::content_type_for(&task.filename).to_string());

    serve_image_file(&path, id, "Source image", content_type, "public, max-age=86400").await
}

/// GET /api/tasks/{id}/preview
///
/// 404 until the task has completed and its output exists.
pub async fn get_preview(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<Response> {
    let path = state.service.ready_preview(id).await?.ok_or(CoreError::NotFound {
        entity: "Preview",
        id: id.to_string(),
    })?;

    // A later adjustment rewrites the same file.
    serve_image_file(&path, id, "Preview", "image/png".to_string(), "no-cache").await
}

async fn serve_image_file(
    path: &FsPath,
    id: TaskId,
    entity: &'static str,
    content_type: String,
    cache_control: &'static str,
) -> AppResult<Response> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CoreError::NotFound {
                entity,
                id: id.to_string(),
            }
            .into());
        }
        Err(e) => {
            return Err(AppError::InternalError(format!(
                "Failed to read {}: {e}",
                path.display()
            )));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, cache_control.to_string()),
        ],
        data,
    )
        .into_response())
}
