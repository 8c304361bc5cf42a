use axum::routing::get;
use axum::Router;

use crate::handlers::catalog;
use crate::state::AppState;

/// Routes mounted at `/catalog`.
///
/// ```text
/// GET    /                -> get_catalog
/// GET    /models          -> list_models
/// GET    /pipelines       -> list_pipelines
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog::get_catalog))
        .route("/models", get(catalog::list_models))
        .route("/pipelines", get(catalog::list_pipelines))
}
