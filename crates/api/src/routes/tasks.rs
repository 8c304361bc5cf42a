use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /                -> list_tasks
/// GET    /{id}            -> get_task
/// PATCH  /{id}            -> update_task
/// GET    /{id}/source     -> get_source
/// GET    /{id}/preview    -> get_preview
/// POST   /{id}/process    -> process_task
/// POST   /{id}/adjust     -> adjust_task
/// POST   /{id}/cancel     -> cancel_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks))
        .route("/{id}", get(tasks::get_task).patch(tasks::update_task))
        .route("/{id}/source", get(tasks::get_source))
        .route("/{id}/preview", get(tasks::get_preview))
        .route("/{id}/process", post(tasks::process_task))
        .route("/{id}/adjust", post(tasks::adjust_task))
        .route("/{id}/cancel", post(tasks::cancel_task))
}
