use axum::routing::get;
use axum::Router;

use crate::handlers::reports;
use crate::state::AppState;

/// Routes mounted at `/reports`.
///
/// ```text
/// GET    /{task_id}       -> get_report
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{task_id}", get(reports::get_report))
}
