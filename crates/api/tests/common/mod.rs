#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use relaize_api::config::ServerConfig;
use relaize_api::router::build_app_router;
use relaize_api::state::AppState;
use relaize_db::{MemoryTaskQueue, MemoryTaskRepo, StoragePaths, TaskService};
use tower::ServiceExt;

pub const BOUNDARY: &str = "relaize-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and a 1 MiB upload limit.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        api_prefix: "/api".to_string(),
        max_upload_bytes: 1024 * 1024,
        embedded_worker: false,
    }
}

/// An app backed by in-memory stores and a temporary storage directory.
pub struct TestApp {
    pub service: Arc<TaskService>,
    pub queue: Arc<MemoryTaskQueue>,
    router: Router,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// A fresh clone of the router (`oneshot` consumes it).
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let queue = Arc::new(MemoryTaskQueue::new());
    let paths = StoragePaths {
        upload_dir: dir.path().join("uploads"),
        processed_dir: dir.path().join("processed"),
        url_prefix: config.api_prefix.clone(),
    };
    let service = Arc::new(TaskService::new(
        Arc::new(MemoryTaskRepo::new()),
        queue.clone(),
        paths,
    ));

    let state = AppState {
        service: Arc::clone(&service),
        config: Arc::new(config.clone()),
    };

    TestApp {
        service,
        queue,
        router: build_app_router(state, &config),
        _dir: dir,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::post(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, "POST", uri, body).await
}

pub async fn patch_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, "PATCH", uri, body).await
}

async fn send_json(app: Router, method: &str, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a single-file multipart form.
pub async fn post_file(
    app: Router,
    uri: &str,
    field: &str,
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> Response<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A small valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(8, 8, |x, y| {
        image::Rgb([(x * 30) as u8, (y * 30) as u8, 96])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Upload a PNG through the API and return the new task id.
pub async fn upload_png(app: &TestApp, filename: &str) -> uuid::Uuid {
    let response = post_file(
        app.router(),
        "/api/uploads",
        "file",
        filename,
        "image/png",
        &png_bytes(),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["task_id"].as_str().unwrap().parse().unwrap()
}
