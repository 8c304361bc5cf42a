//! The task worker: pops task ids off the queue and runs them through the
//! restoration pipeline, one at a time.

use std::sync::Arc;
use std::time::Duration;

use relaize_core::error::CoreError;
use relaize_core::task::TaskStatus;
use relaize_core::types::TaskId;
use relaize_db::{StoreError, TaskService};
use relaize_pipeline::ImageProcessor;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Queue token that makes the worker loop exit.
pub const SHUTDOWN_SENTINEL: &str = "__shutdown__";

/// Pause after a queue or store error before polling again.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound of one blocking pop.
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened to a popped task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Failed,
    /// Unknown id, missing record, or the task was not pending.
    Skipped,
    /// The task was cancelled while it was processing; the result was
    /// thrown away.
    Discarded,
}

pub struct TaskWorker {
    service: Arc<TaskService>,
    processor: ImageProcessor,
    pop_timeout: Duration,
    cancel: CancellationToken,
}

impl TaskWorker {
    pub fn new(service: Arc<TaskService>, processor: ImageProcessor, pop_timeout: Duration) -> Self {
        Self {
            service,
            processor,
            pop_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Poll the queue until [`stop`](Self::stop) is called.
    ///
    /// A sentinel popped by a worker that was not stopped is ignored.
    pub async fn run(&self) {
        tracing::info!(pop_timeout_secs = self.pop_timeout.as_secs(), "Task worker started");

        while !self.cancel.is_cancelled() {
            let token = match self.service.queue().blocking_pop(self.pop_timeout).await {
                Ok(Some(token)) => token,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Task queue pop failed");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            if token == SHUTDOWN_SENTINEL {
                if self.cancel.is_cancelled() {
                    break;
                }
                // Left behind by a worker that stopped mid-task.
                tracing::warn!("Ignoring stale shutdown sentinel");
                continue;
            }

            if let Err(e) = self.process_task(&token).await {
                tracing::error!(task_id = %token, error = %e, "Task worker error");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }

        // stop() may have pushed a sentinel this loop never popped.
        match self.service.queue().remove(SHUTDOWN_SENTINEL).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Removed leftover shutdown sentinel"),
            Err(e) => tracing::warn!(error = %e, "Failed to remove shutdown sentinel"),
        }

        tracing::info!("Task worker stopped");
    }

    /// Run one queued task to completion or failure.
    ///
    /// Store errors are returned; pipeline errors are recorded on the task.
    pub async fn process_task(&self, token: &str) -> Result<ProcessOutcome, StoreError> {
        let Ok(id) = token.parse::<TaskId>() else {
            tracing::warn!(token = %token, "Ignoring malformed queue entry");
            return Ok(ProcessOutcome::Skipped);
        };

        let task = match self.service.get_task(id).await {
            Ok(task) => task,
            Err(StoreError::Core(CoreError::NotFound { .. })) => {
                tracing::warn!(task_id = %id, "Task not found in storage");
                return Ok(ProcessOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        if task.status != TaskStatus::Pending {
            tracing::info!(task_id = %id, status = %task.status, "Skipping task that is not pending");
            return Ok(ProcessOutcome::Skipped);
        }

        match self.service.mark_processing(id).await {
            Ok(_) => {}
            Err(StoreError::Core(CoreError::Conflict(_))) => return Ok(ProcessOutcome::Skipped),
            Err(e) => return Err(e),
        }

        tracing::info!(task_id = %id, filename = %task.filename, "Processing task");
        let source = self.service.source_path(&task);
        let destination = self.service.processed_path(id);

        let result = self
            .processor
            .enhance_image(&source, &destination, task.adjustments.as_ref())
            .await;

        let recorded = match result {
            Ok(outcome) => self
                .service
                .mark_completed(id, outcome.metrics, outcome.pipeline)
                .await
                .map(|_| ProcessOutcome::Completed),
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "Task failed");
                self.service
                    .mark_failed(id, e.to_string())
                    .await
                    .map(|_| ProcessOutcome::Failed)
            }
        };

        match recorded {
            Ok(ProcessOutcome::Completed) => {
                tracing::info!(task_id = %id, "Task completed");
                Ok(ProcessOutcome::Completed)
            }
            Ok(outcome) => Ok(outcome),
            Err(StoreError::Core(CoreError::Conflict(_))) => {
                tracing::info!(task_id = %id, "Task was cancelled while processing; discarding result");
                if let Err(e) = tokio::fs::remove_file(&destination).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(task_id = %id, error = %e, "Failed to remove discarded output");
                    }
                }
                Ok(ProcessOutcome::Discarded)
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the loop to exit after the current task.
    ///
    /// The sentinel wakes a blocked pop immediately; without it the loop
    /// still exits once the pending pop times out.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Err(e) = self.service.queue().push_front(SHUTDOWN_SENTINEL).await {
            tracing::warn!(error = %e, "Failed to push shutdown sentinel");
        }
    }

    /// Run the loop on a background task.
    pub fn spawn(self: Arc<Self>) -> WorkerHandle {
        let worker = Arc::clone(&self);
        let handle = tokio::spawn(async move { worker.run().await });
        WorkerHandle {
            worker: self,
            handle,
        }
    }
}

/// A worker running on a background task.
pub struct WorkerHandle {
    worker: Arc<TaskWorker>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the worker and wait up to `grace` for the current task.
    pub async fn shutdown(self, grace: Duration) {
        self.worker.stop().await;
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Task worker panicked"),
            Err(_) => tracing::warn!(
                grace_secs = grace.as_secs(),
                "Task worker did not stop in time; abandoning current task"
            ),
        }
    }
}
