//! HTTP-level tests for the read-only `/api/catalog` endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, get};
use relaize_core::catalog;

#[tokio::test]
async fn catalog_lists_models_and_pipelines() {
    let app = common::build_test_app();
    let response = get(app.router(), "/api/catalog").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(
        json["data"]["models"].as_array().unwrap().len(),
        catalog::models().len()
    );
    assert_eq!(
        json["data"]["pipelines"].as_array().unwrap().len(),
        catalog::pipelines().len()
    );
    assert_eq!(json["data"]["default_pipeline"], "superres_basic");
}

#[tokio::test]
async fn models_endpoint_returns_catalog_entries() {
    let app = common::build_test_app();
    let json = body_json(get(app.router(), "/api/catalog/models").await).await;

    let models = json["data"].as_array().unwrap();
    assert_eq!(models.len(), 11);
    assert!(models.iter().any(|m| m["id"] == "GFPGAN_v1.4" && m["kind"] == "face"));
}

#[tokio::test]
async fn pipelines_endpoint_includes_stage_defaults() {
    let app = common::build_test_app();
    let json = body_json(get(app.router(), "/api/catalog/pipelines").await).await;

    let basic = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == "superres_basic")
        .cloned()
        .unwrap();
    assert_eq!(basic["stages"][0]["id"], "superres");
    assert_eq!(basic["stages"][0]["defaults"]["scale"], 4);
}
