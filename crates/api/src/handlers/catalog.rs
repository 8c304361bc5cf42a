//! Read-only views of the model and pipeline catalog.

use axum::response::IntoResponse;
use axum::Json;
use relaize_core::catalog::{self, ModelSpec, PipelineSpec, DEFAULT_PIPELINE_ID};
use serde::Serialize;

use crate::response::DataResponse;

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub models: &'static [ModelSpec],
    pub pipelines: &'static [PipelineSpec],
    pub default_pipeline: &'static str,
}

/// GET /api/catalog
pub async fn get_catalog() -> impl IntoResponse {
    Json(DataResponse {
        data: CatalogResponse {
            models: catalog::models(),
            pipelines: catalog::pipelines(),
            default_pipeline: DEFAULT_PIPELINE_ID,
        },
    })
}

/// GET /api/catalog/models
pub async fn list_models() -> impl IntoResponse {
    Json(DataResponse {
        data: catalog::models(),
    })
}

/// GET /api/catalog/pipelines
pub async fn list_pipelines() -> impl IntoResponse {
    Json(DataResponse {
        data: catalog::pipelines(),
    })
}
