pub mod catalog;
pub mod health;
pub mod reports;
pub mod tasks;
pub mod uploads;

use axum::Router;

use crate::state::AppState;

/// Build the API route tree, nested under the configured prefix.
///
/// Route hierarchy:
///
/// ```text
/// /uploads                      upload an image (POST)
///
/// /tasks                        list
/// /tasks/{id}                   get, update (PATCH)
/// /tasks/{id}/source            original image
/// /tasks/{id}/preview           restored image
/// /tasks/{id}/process           requeue (POST)
/// /tasks/{id}/adjust            save adjustments and requeue (POST)
/// /tasks/{id}/cancel            cancel (POST)
///
/// /reports/{task_id}            quality report
///
/// /catalog                      models and pipelines
/// /catalog/models               models
/// /catalog/pipelines            pipelines
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/uploads", uploads::router())
        .nest("/tasks", tasks::router())
        .nest("/reports", reports::router())
        .nest("/catalog", catalog::router())
}
