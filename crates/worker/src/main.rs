use std::sync::Arc;
use std::time::Duration;

use relaize_db::{StoragePaths, StoreConfig, TaskService};
use relaize_pipeline::{ImageProcessor, PipelineConfig, PipelineRunner};
use relaize_worker::TaskWorker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long a running task may take to finish after Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relaize_worker=debug,relaize_pipeline=debug,relaize_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store_config = StoreConfig::from_env();
    let (repo, queue) = relaize_db::connect_store(&store_config)
        .await
        .expect("Failed to connect to the task store");

    let paths = StoragePaths::from_env();
    paths
        .ensure_dirs()
        .await
        .expect("Failed to create storage directories");

    let runner = PipelineRunner::from_config(PipelineConfig::from_env());
    let service = Arc::new(TaskService::new(repo, queue, paths));
    let worker = Arc::new(TaskWorker::new(
        service,
        ImageProcessor::new(Arc::new(runner)),
        store_config.pop_timeout,
    ));

    let handle = worker.spawn();

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");

    handle.shutdown(SHUTDOWN_GRACE).await;
}
