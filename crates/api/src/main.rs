use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relaize_api::config::ServerConfig;
use relaize_api::router::build_app_router;
use relaize_api::state::AppState;
use relaize_db::{StoragePaths, StoreConfig, TaskService};
use relaize_pipeline::{ImageProcessor, PipelineConfig, PipelineRunner};
use relaize_worker::TaskWorker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaize_api=debug,relaize_worker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        api_prefix = %config.api_prefix,
        "Loaded server configuration"
    );

    // --- Task store ---
    let store_config = StoreConfig::from_env();
    let (repo, queue) = relaize_db::connect_store(&store_config)
        .await
        .expect("Failed to connect to the task store");
    tracing::info!(backend = repo.backend_name(), "Task store connected");

    let mut paths = StoragePaths::from_env();
    paths.url_prefix = config.api_prefix.clone();
    paths
        .ensure_dirs()
        .await
        .expect("Failed to create storage directories");
    tracing::info!(
        upload_dir = %paths.upload_dir.display(),
        processed_dir = %paths.processed_dir.display(),
        "Storage directories ready"
    );

    let service = Arc::new(TaskService::new(repo, queue, paths));

    // --- Embedded worker ---
    let worker_handle = if config.embedded_worker {
        let runner = PipelineRunner::from_config(PipelineConfig::from_env());
        let worker = Arc::new(TaskWorker::new(
            Arc::clone(&service),
            ImageProcessor::new(Arc::new(runner)),
            store_config.pop_timeout,
        ));
        tracing::info!("Embedded task worker started");
        Some(worker.spawn())
    } else {
        tracing::info!("Embedded task worker disabled; run relaize-worker separately");
        None
    };

    // --- Router ---
    let state = AppState {
        service,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid HOST:PORT combination");
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    if let Some(handle) = worker_handle {
        handle
            .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
            .await;
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
