//! Handler for image uploads.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use relaize_core::types::TaskId;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Name of the multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub task_id: TaskId,
    pub filename: String,
    pub message: String,
}

/// POST /api/uploads
///
/// Accepts a multipart form with a required `file` field. The image is
/// stored and a `pending` task is queued for it. Returns 201.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != UPLOAD_FIELD {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        // Browsers send `application/octet-stream` for unknown types; the
        // service derives one from the extension instead.
        let content_type = field
            .content_type()
            .filter(|ct| ct.starts_with("image/"))
            .map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        upload = Some((filename, content_type, data.to_vec()));
    }

    let (filename, content_type, data) = upload
        .ok_or_else(|| AppError::BadRequest(format!("Missing required '{UPLOAD_FIELD}' field")))?;

    let task = state
        .service
        .create_from_upload(&filename, content_type, &data)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: UploadResponse {
                task_id: task.id,
                filename: task.filename,
                message: task.message.unwrap_or_default(),
            },
        }),
    ))
}
