use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use relaize_core::report::build_report;
use relaize_core::types::TaskId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/reports/{task_id}
///
/// Quality report for a processed task. 409 until the task has metrics.
pub async fn get_report(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let task = state.service.get_task(task_id).await?;
    let report = build_report(&task)?;
    Ok(Json(DataResponse { data: report }))
}
