use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use relaize_core::catalog::KIND_SUPERRES;
use relaize_core::task::{TaskDetail, TaskStatus};
use relaize_core::types::TaskId;
use relaize_db::{ListTasksQuery, MemoryTaskQueue, MemoryTaskRepo, StoragePaths, TaskQueue, TaskService};
use relaize_pipeline::{
    ExecutorRegistry, ImageProcessor, PipelineConfig, PipelineRunner, StageError, StageExecutor,
    StageRequest,
};
use relaize_worker::{ProcessOutcome, TaskWorker, SHUTDOWN_SENTINEL};

struct Harness {
    service: Arc<TaskService>,
    queue: Arc<MemoryTaskQueue>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(MemoryTaskQueue::new());
    let paths = StoragePaths {
        upload_dir: dir.path().join("uploads"),
        processed_dir: dir.path().join("processed"),
        url_prefix: "/api".into(),
    };
    let service = Arc::new(TaskService::new(
        Arc::new(MemoryTaskRepo::new()),
        queue.clone(),
        paths,
    ));
    Harness {
        service,
        queue,
        _dir: dir,
    }
}

fn worker_with(service: &Arc<TaskService>, registry: ExecutorRegistry) -> TaskWorker {
    let runner = PipelineRunner::new(registry, PipelineConfig::default());
    TaskWorker::new(
        Arc::clone(service),
        ImageProcessor::new(Arc::new(runner)),
        Duration::from_millis(50),
    )
}

fn default_worker(service: &Arc<TaskService>) -> TaskWorker {
    worker_with(service, ExecutorRegistry::from_config(&PipelineConfig::default()))
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(8, 8, |x, y| image::Rgb([(x * 30) as u8, (y * 30) as u8, 128]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

async fn upload(h: &Harness, bytes: &[u8]) -> TaskDetail {
    let task = h
        .service
        .create_from_upload("reef.png", Some("image/png".into()), bytes)
        .await
        .unwrap();
    // Tests drive process_task directly; drop the queue entry.
    h.queue.pop().await.unwrap();
    task
}

#[tokio::test]
async fn completes_task_with_metrics_and_preview() {
    let h = harness();
    let task = upload(&h, &png_bytes()).await;
    let worker = default_worker(&h.service);

    let outcome = worker.process_task(&task.id.to_string()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Completed);

    let done = h.service.get_task(task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.metrics.as_ref().map(|m| m.len()), Some(4));
    assert_eq!(done.pipeline.as_ref().unwrap().pipeline_id, "superres_basic");
    assert_eq!(
        done.preview_url.as_deref(),
        Some(format!("/api/tasks/{}/preview", task.id).as_str())
    );
    assert!(done.processed_at.is_some());

    let output = h.service.processed_path(task.id);
    assert_eq!(image::image_dimensions(&output).unwrap(), (32, 32));
}

#[tokio::test]
async fn undecodable_upload_marks_task_failed() {
    let h = harness();
    let task = upload(&h, b"definitely not a png").await;
    let worker = default_worker(&h.service);

    let outcome = worker.process_task(&task.id.to_string()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Failed);

    let failed = h.service.get_task(task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.message.unwrap().contains("Unable to read image"));
}

#[tokio::test]
async fn skips_cancelled_unknown_and_malformed_entries() {
    let h = harness();
    let task = upload(&h, &png_bytes()).await;
    h.service.cancel_task(task.id).await.unwrap();
    let worker = default_worker(&h.service);

    assert_eq!(
        worker.process_task(&task.id.to_string()).await.unwrap(),
        ProcessOutcome::Skipped
    );
    assert_eq!(
        h.service.get_task(task.id).await.unwrap().status,
        TaskStatus::Cancelled
    );

    let unknown = uuid::Uuid::new_v4().to_string();
    assert_eq!(worker.process_task(&unknown).await.unwrap(), ProcessOutcome::Skipped);
    assert_eq!(worker.process_task("garbage").await.unwrap(), ProcessOutcome::Skipped);
}

/// Cancels every processing task from inside the stage, then succeeds.
struct CancellingExecutor {
    service: Arc<TaskService>,
}

#[async_trait]
impl StageExecutor for CancellingExecutor {
    async fn run(&self, request: StageRequest<'_>) -> Result<(), StageError> {
        let processing = self
            .service
            .list_tasks(&ListTasksQuery {
                status: Some(TaskStatus::Processing),
                ..Default::default()
            })
            .await
            .unwrap();
        for task in processing {
            self.service.cancel_task(task.id).await.unwrap();
        }
        tokio::fs::copy(request.input, request.output).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cancelling"
    }
}

#[tokio::test]
async fn result_discarded_when_cancelled_mid_run() {
    let h = harness();
    let task = upload(&h, &png_bytes()).await;

    let mut registry = ExecutorRegistry::new();
    registry.register(
        KIND_SUPERRES,
        Arc::new(CancellingExecutor {
            service: Arc::clone(&h.service),
        }),
    );
    let worker = worker_with(&h.service, registry);

    let outcome = worker.process_task(&task.id.to_string()).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Discarded);

    let stored = h.service.get_task(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Cancelled);
    assert!(stored.metrics.is_none());
    assert!(!h.service.processed_path(task.id).exists());
}

#[tokio::test]
async fn loop_processes_queue_and_stops_on_sentinel() {
    let h = harness();
    let task = h
        .service
        .create_from_upload("reef.png", None, &png_bytes())
        .await
        .unwrap();

    let worker = Arc::new(default_worker(&h.service));
    let handle = Arc::clone(&worker).spawn();

    let completed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let current = h.service.get_task(task.id).await.unwrap();
            if current.status.is_terminal() {
                return current.status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(completed, TaskStatus::Completed);

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown(Duration::from_secs(5)))
        .await
        .unwrap();
}

async fn wait_for_terminal(service: &TaskService, id: TaskId) -> TaskStatus {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let current = service.get_task(id).await.unwrap();
            if current.status.is_terminal() {
                return current.status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn stale_sentinel_does_not_end_loop() {
    let h = harness();
    h.queue.push(SHUTDOWN_SENTINEL).await.unwrap();
    let task = h
        .service
        .create_from_upload("reef.png", None, &png_bytes())
        .await
        .unwrap();

    let worker = Arc::new(default_worker(&h.service));
    let handle = Arc::clone(&worker).spawn();

    assert_eq!(wait_for_terminal(&h.service, task.id).await, TaskStatus::Completed);

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

/// Holds the stage open until released, then copies input to output.
struct GatedExecutor {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl StageExecutor for GatedExecutor {
    async fn run(&self, request: StageRequest<'_>) -> Result<(), StageError> {
        self.started.notify_one();
        self.release.notified().await;
        tokio::fs::copy(request.input, request.output).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

#[tokio::test]
async fn stop_mid_task_leaves_queue_usable_for_next_worker() {
    let h = harness();
    let first = h
        .service
        .create_from_upload("reef.png", None, &png_bytes())
        .await
        .unwrap();

    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let mut registry = ExecutorRegistry::new();
    registry.register(
        KIND_SUPERRES,
        Arc::new(GatedExecutor {
            started: Arc::clone(&started),
            release: Arc::clone(&release),
        }),
    );
    let worker = Arc::new(worker_with(&h.service, registry));
    let handle = Arc::clone(&worker).spawn();

    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .unwrap();
    let stopping = tokio::spawn(handle.shutdown(Duration::from_secs(5)));
    tokio::time::timeout(Duration::from_secs(5), async {
        while !h.queue.snapshot().await.iter().any(|t| t == SHUTDOWN_SENTINEL) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), stopping)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.service.get_task(first.id).await.unwrap().status, TaskStatus::Completed);
    assert!(!h.queue.snapshot().await.iter().any(|t| t == SHUTDOWN_SENTINEL));

    let second = h
        .service
        .create_from_upload("reef.png", None, &png_bytes())
        .await
        .unwrap();
    let next = Arc::new(default_worker(&h.service));
    let next_handle = Arc::clone(&next).spawn();

    assert_eq!(wait_for_terminal(&h.service, second.id).await, TaskStatus::Completed);

    tokio::time::timeout(Duration::from_secs(5), next_handle.shutdown(Duration::from_secs(5)))
        .await
        .unwrap();
}
