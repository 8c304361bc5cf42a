//! Task lifecycle operations shared by the REST API and the worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use relaize_core::adjustments::AdjustmentPayload;
use relaize_core::error::CoreError;
use relaize_core::metrics::MetricMap;
use relaize_core::naming;
use relaize_core::task::{PipelineRunSummary, TaskDetail, TaskStatus, TaskSummary, TaskUpdate};
use relaize_core::types::TaskId;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::queue::TaskQueue;
use crate::repositories::TaskRepo;

/// Default page size for task listing.
pub const DEFAULT_LIMIT: u64 = 50;

/// Maximum page size for task listing.
pub const MAX_LIMIT: u64 = 200;

pub const MSG_QUEUED: &str = "queued for processing";
pub const MSG_REQUEUED: &str = "requeued for processing";
pub const MSG_PROCESSING: &str = "processing";
pub const MSG_COMPLETED: &str = "processing complete";
pub const MSG_CANCELLED: &str = "cancelled by user";
pub const MSG_ADJUSTED: &str = "adjustments saved; requeued for processing";

/// On-disk locations and the URL prefix used for generated links.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
    /// Prefix of the API routes, e.g. `/api`.
    pub url_prefix: String,
}

impl StoragePaths {
    /// Load storage locations from environment variables with defaults.
    ///
    /// | Env Var         | Default                    |
    /// |-----------------|----------------------------|
    /// | `STORAGE_ROOT`  | `storage`                  |
    /// | `UPLOAD_DIR`    | `<STORAGE_ROOT>/uploads`   |
    /// | `PROCESSED_DIR` | `<STORAGE_ROOT>/processed` |
    /// | `API_PREFIX`    | `/api`                     |
    pub fn from_env() -> Self {
        let root = PathBuf::from(std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "storage".into()));
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join("uploads"));
        let processed_dir = std::env::var("PROCESSED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join("processed"));
        let url_prefix = normalize_prefix(&std::env::var("API_PREFIX").unwrap_or_else(|_| "/api".into()));

        Self {
            upload_dir,
            processed_dir,
            url_prefix,
        }
    }

    /// Create both directories if they are missing.
    pub async fn ensure_dirs(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.processed_dir).await?;
        Ok(())
    }

    fn source_url(&self, id: TaskId) -> String {
        format!("{}/tasks/{id}/source", self.url_prefix)
    }

    fn preview_url(&self, id: TaskId) -> String {
        format!("{}/tasks/{id}/preview", self.url_prefix)
    }
}

/// `api/` → `/api`, `/` → empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Query parameters for task listing.
#[derive(Debug, Clone, Default)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// Clamp a user-provided page size to `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Task Store CRUD plus queue bookkeeping.
///
/// Updates are read-modify-write on whole records; they are serialized
/// through an in-process lock so the embedded worker and request handlers
/// never overwrite each other's changes.
pub struct TaskService {
    repo: Arc<dyn TaskRepo>,
    queue: Arc<dyn TaskQueue>,
    paths: StoragePaths,
    write_lock: Mutex<()>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepo>, queue: Arc<dyn TaskQueue>, paths: StoragePaths) -> Self {
        Self {
            repo,
            queue,
            paths,
            write_lock: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn backend_name(&self) -> &'static str {
        self.repo.backend_name()
    }

    /// Check both the record store and the queue.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.repo.ping().await?;
        self.queue.len().await?;
        Ok(())
    }

    // -- creation ----------------------------------------------------------

    /// Store an uploaded image and queue a new task for it.
    pub async fn create_from_upload(
        &self,
        filename: &str,
        content_type: Option<String>,
        data: &[u8],
    ) -> Result<TaskDetail, StoreError> {
        let filename = naming::sanitize_filename(filename)?;
        naming::validate_image_extension(&filename)?;
        if data.is_empty() {
            return Err(CoreError::Validation("Uploaded file is empty".to_string()).into());
        }

        let id = uuid::Uuid::new_v4();
        let path = self
            .paths
            .upload_dir
            .join(naming::source_file_name(id, &filename));
        tokio::fs::create_dir_all(&self.paths.upload_dir).await?;
        tokio::fs::write(&path, data).await?;

        let content_type =
            content_type.or_else(|| Some(naming::content_type_for(&filename).to_string()));
        let mut task = TaskDetail::new_pending(
            id,
            filename,
            Some(data.len() as u64),
            content_type,
            Some(self.paths.source_url(id)),
        );
        task.message = Some(MSG_QUEUED.to_string());

        if let Err(e) = self.repo.save(&task).await {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %rm, "Failed to remove orphaned upload");
            }
            return Err(e);
        }
        self.queue.push(&id.to_string()).await?;

        tracing::info!(task_id = %id, filename = %task.filename, size = data.len(), "Task created");
        Ok(task)
    }

    // -- reads -------------------------------------------------------------

    /// A page of tasks, newest first.
    ///
    /// The status filter is applied to the fetched page, so a filtered page
    /// may hold fewer than `limit` entries.
    pub async fn list_tasks(&self, query: &ListTasksQuery) -> Result<Vec<TaskSummary>, StoreError> {
        let limit = clamp_limit(query.limit);
        let offset = query.offset.unwrap_or(0);
        let tasks = self.repo.list(offset, limit).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .map(TaskSummary::from)
            .collect())
    }

    pub async fn get_task(&self, id: TaskId) -> Result<TaskDetail, StoreError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id).into())
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.repo.count().await
    }

    // -- updates -----------------------------------------------------------

    /// Apply a partial update, enforcing the status state machine.
    ///
    /// Adjustments are validated like in [`apply_adjustments`](Self::apply_adjustments).
    /// Moving a finished task back to `pending` queues it again.
    pub async fn update_task(&self, id: TaskId, update: TaskUpdate) -> Result<TaskDetail, StoreError> {
        if let Some(adjustments) = &update.adjustments {
            adjustments.validate()?;
        }

        let _guard = self.write_lock.lock().await;
        let previous = self.get_task(id).await?.status;
        let task = self.update_locked(id, update).await?;
        if previous != TaskStatus::Pending && task.status == TaskStatus::Pending {
            self.queue.push(&id.to_string()).await?;
            tracing::info!(task_id = %id, from = %previous, "Task requeued by update");
        }
        Ok(task)
    }

    async fn update_locked(&self, id: TaskId, update: TaskUpdate) -> Result<TaskDetail, StoreError> {
        let mut task = self.get_task(id).await?;
        let from = task.status;
        task.apply(update)?;
        self.repo.save(&task).await?;
        if from != task.status {
            tracing::debug!(task_id = %id, from = %from, to = %task.status, "Task status changed");
        }
        Ok(task)
    }

    pub async fn mark_processing(&self, id: TaskId) -> Result<TaskDetail, StoreError> {
        self.update_task(
            id,
            TaskUpdate {
                status: Some(TaskStatus::Processing),
                message: Some(MSG_PROCESSING.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    /// Record a successful run. Sets the preview link and `processed_at`.
    pub async fn mark_completed(
        &self,
        id: TaskId,
        metrics: MetricMap,
        pipeline: PipelineRunSummary,
    ) -> Result<TaskDetail, StoreError> {
        self.update_task(
            id,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                metrics: Some(metrics),
                pipeline: Some(pipeline),
                preview_url: Some(self.paths.preview_url(id)),
                processed_at: Some(chrono::Utc::now()),
                message: Some(MSG_COMPLETED.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_failed(&self, id: TaskId, message: impl Into<String>) -> Result<TaskDetail, StoreError> {
        self.update_task(
            id,
            TaskUpdate {
                status: Some(TaskStatus::Failed),
                message: Some(message.into()),
                ..Default::default()
            },
        )
        .await
    }

    /// Send a finished task back to the queue.
    pub async fn enqueue_task(&self, id: TaskId) -> Result<TaskDetail, StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.get_task(id).await?;
        if !current.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Task {id} is already '{}'; only finished tasks can be requeued",
                current.status
            ))
            .into());
        }

        let task = self
            .update_locked(
                id,
                TaskUpdate {
                    status: Some(TaskStatus::Pending),
                    message: Some(MSG_REQUEUED.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        self.queue.push(&id.to_string()).await?;
        tracing::info!(task_id = %id, "Task requeued");
        Ok(task)
    }

    pub async fn cancel_task(&self, id: TaskId) -> Result<TaskDetail, StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.get_task(id).await?;
        if current.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Task {id} is already '{}' and cannot be cancelled",
                current.status
            ))
            .into());
        }

        let task = self
            .update_locked(
                id,
                TaskUpdate {
                    status: Some(TaskStatus::Cancelled),
                    message: Some(MSG_CANCELLED.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!(task_id = %id, "Task cancelled");
        Ok(task)
    }

    /// Store new enhancement parameters and queue the task again.
    ///
    /// A task that is still `pending` keeps its existing queue entry.
    pub async fn apply_adjustments(
        &self,
        id: TaskId,
        payload: AdjustmentPayload,
    ) -> Result<TaskDetail, StoreError> {
        payload.validate()?;

        let _guard = self.write_lock.lock().await;
        let current = self.get_task(id).await?;
        if current.status == TaskStatus::Processing {
            return Err(CoreError::Conflict(format!(
                "Task {id} is being processed; adjust it after the run finishes"
            ))
            .into());
        }
        let already_queued = current.status == TaskStatus::Pending;

        let task = self
            .update_locked(
                id,
                TaskUpdate {
                    status: Some(TaskStatus::Pending),
                    adjustments: Some(payload),
                    message: Some(MSG_ADJUSTED.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        if !already_queued {
            self.queue.push(&id.to_string()).await?;
        }
        tracing::info!(task_id = %id, requeued = !already_queued, "Adjustments applied");
        Ok(task)
    }

    // -- files -------------------------------------------------------------

    /// Path of the uploaded original.
    pub fn source_path(&self, task: &TaskDetail) -> PathBuf {
        self.paths
            .upload_dir
            .join(naming::source_file_name(task.id, &task.filename))
    }

    /// Path the restored PNG is written to.
    pub fn processed_path(&self, id: TaskId) -> PathBuf {
        self.paths.processed_dir.join(naming::processed_file_name(id))
    }

    /// The restored image, if the task completed and the file exists.
    ///
    /// Output left over from an earlier run is not served once the task is
    /// back in the queue; the next run replaces it.
    pub async fn ready_preview(&self, id: TaskId) -> Result<Option<PathBuf>, StoreError> {
        let task = self.get_task(id).await?;
        if task.status != TaskStatus::Completed {
            return Ok(None);
        }
        let path = self.processed_path(id);
        Ok(file_exists(&path).await.then_some(path))
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::queue::MemoryTaskQueue;
    use crate::repositories::MemoryTaskRepo;

    struct Fixture {
        service: TaskService,
        queue: Arc<MemoryTaskQueue>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(MemoryTaskQueue::new());
        let paths = StoragePaths {
            upload_dir: dir.path().join("uploads"),
            processed_dir: dir.path().join("processed"),
            url_prefix: "/api".to_string(),
        };
        let service = TaskService::new(Arc::new(MemoryTaskRepo::new()), queue.clone(), paths);
        Fixture {
            service,
            queue,
            _dir: dir,
        }
    }

    async fn upload(f: &Fixture) -> TaskDetail {
        f.service
            .create_from_upload("reef.png", None, b"not-really-png")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upload_writes_file_and_queues_task() {
        let f = fixture();
        let task = upload(&f).await;

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.size, Some(14));
        assert_eq!(task.content_type.as_deref(), Some("image/png"));
        assert_eq!(
            task.source_url.as_deref(),
            Some(format!("/api/tasks/{}/source", task.id).as_str())
        );
        assert_eq!(f.queue.snapshot().await, vec![task.id.to_string()]);

        let bytes = tokio::fs::read(f.service.source_path(&task)).await.unwrap();
        assert_eq!(bytes, b"not-really-png");
    }

    #[tokio::test]
    async fn upload_rejects_bad_input() {
        let f = fixture();
        assert_matches!(
            f.service.create_from_upload("notes.txt", None, b"x").await,
            Err(StoreError::Core(CoreError::Validation(_)))
        );
        assert_matches!(
            f.service.create_from_upload("empty.png", None, b"").await,
            Err(StoreError::Core(CoreError::Validation(_)))
        );
        assert_eq!(f.queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upload_sanitizes_path_components() {
        let f = fixture();
        let task = f
            .service
            .create_from_upload("../../evil.jpg", None, b"x")
            .await
            .unwrap();
        assert_eq!(task.filename, "evil.jpg");
        assert!(f.service.source_path(&task).starts_with(&f.service.paths().upload_dir));
    }

    #[tokio::test]
    async fn get_missing_task_is_not_found() {
        let f = fixture();
        assert_matches!(
            f.service.get_task(uuid::Uuid::new_v4()).await,
            Err(StoreError::Core(CoreError::NotFound { .. }))
        );
    }

    #[tokio::test]
    async fn lifecycle_to_completed_sets_preview() {
        let f = fixture();
        let task = upload(&f).await;

        f.service.mark_processing(task.id).await.unwrap();
        let summary = PipelineRunSummary {
            pipeline_id: "superres_basic".into(),
            pipeline_name: "Super resolution".into(),
            stages: vec![],
        };
        let done = f
            .service
            .mark_completed(task.id, MetricMap::new(), summary)
            .await
            .unwrap();

        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.processed_at.is_some());
        assert_eq!(
            done.preview_url.as_deref(),
            Some(format!("/api/tasks/{}/preview", task.id).as_str())
        );
        assert_eq!(done.message.as_deref(), Some(MSG_COMPLETED));
    }

    #[tokio::test]
    async fn illegal_transition_is_conflict() {
        let f = fixture();
        let task = upload(&f).await;
        let result = f
            .service
            .update_task(
                task.id,
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(result, Err(StoreError::Core(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn cancel_then_requeue() {
        let f = fixture();
        let task = upload(&f).await;
        f.queue.pop().await.unwrap();

        let cancelled = f.service.cancel_task(task.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert_eq!(cancelled.message.as_deref(), Some(MSG_CANCELLED));

        assert_matches!(
            f.service.cancel_task(task.id).await,
            Err(StoreError::Core(CoreError::Conflict(_)))
        );

        let requeued = f.service.enqueue_task(task.id).await.unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert_eq!(requeued.message.as_deref(), Some(MSG_REQUEUED));
        assert_eq!(f.queue.snapshot().await, vec![task.id.to_string()]);
    }

    #[tokio::test]
    async fn requeue_of_pending_task_is_conflict() {
        let f = fixture();
        let task = upload(&f).await;
        assert_matches!(
            f.service.enqueue_task(task.id).await,
            Err(StoreError::Core(CoreError::Conflict(_)))
        );
        assert_eq!(f.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn adjustments_requeue_finished_task() {
        let f = fixture();
        let task = upload(&f).await;
        f.queue.pop().await.unwrap();
        f.service.mark_processing(task.id).await.unwrap();
        f.service.mark_failed(task.id, "boom").await.unwrap();

        let payload = AdjustmentPayload {
            preset_id: Some("night".into()),
            target_scale: Some(2.0),
            ..Default::default()
        };
        let adjusted = f.service.apply_adjustments(task.id, payload.clone()).await.unwrap();

        assert_eq!(adjusted.status, TaskStatus::Pending);
        assert_eq!(adjusted.adjustments, Some(payload));
        assert_eq!(f.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn adjustments_on_pending_task_keep_single_queue_entry() {
        let f = fixture();
        let task = upload(&f).await;
        f.service
            .apply_adjustments(task.id, AdjustmentPayload::default())
            .await
            .unwrap();
        assert_eq!(f.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn adjustments_rejected_while_processing_or_invalid() {
        let f = fixture();
        let task = upload(&f).await;

        let invalid = AdjustmentPayload {
            target_scale: Some(50.0),
            ..Default::default()
        };
        assert_matches!(
            f.service.apply_adjustments(task.id, invalid).await,
            Err(StoreError::Core(CoreError::Validation(_)))
        );

        f.service.mark_processing(task.id).await.unwrap();
        assert_matches!(
            f.service
                .apply_adjustments(task.id, AdjustmentPayload::default())
                .await,
            Err(StoreError::Core(CoreError::Conflict(_)))
        );
    }

    #[tokio::test]
    async fn update_to_pending_queues_finished_task() {
        let f = fixture();
        let task = upload(&f).await;
        f.queue.pop().await.unwrap();
        f.service.mark_processing(task.id).await.unwrap();
        f.service.mark_failed(task.id, "boom").await.unwrap();

        let update = TaskUpdate {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        let updated = f.service.update_task(task.id, update).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Pending);
        assert_eq!(f.queue.snapshot().await, vec![task.id.to_string()]);

        // Re-asserting pending does not add a second entry.
        let again = TaskUpdate {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        f.service.update_task(task.id, again).await.unwrap();
        assert_eq!(f.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_validates_adjustments() {
        let f = fixture();
        let task = upload(&f).await;

        let update = TaskUpdate {
            adjustments: Some(AdjustmentPayload {
                target_scale: Some(500.0),
                face_restore_provider: Some("nope".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_matches!(
            f.service.update_task(task.id, update).await,
            Err(StoreError::Core(CoreError::Validation(_)))
        );
        assert!(f.service.get_task(task.id).await.unwrap().adjustments.is_none());
    }

    #[tokio::test]
    async fn list_filters_status_within_page() {
        let f = fixture();
        let first = upload(&f).await;
        let _second = upload(&f).await;
        f.service.cancel_task(first.id).await.unwrap();

        let all = f.service.list_tasks(&ListTasksQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let cancelled = f
            .service
            .list_tasks(&ListTasksQuery {
                status: Some(TaskStatus::Cancelled),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, first.id);
    }

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("/v1/api/"), "/v1/api");
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }

    #[tokio::test]
    async fn preview_ready_only_after_completion_with_file() {
        let f = fixture();
        let task = upload(&f).await;
        assert_eq!(f.service.ready_preview(task.id).await.unwrap(), None);

        f.service.mark_processing(task.id).await.unwrap();
        let summary = PipelineRunSummary {
            pipeline_id: "superres_basic".into(),
            pipeline_name: "Super resolution".into(),
            stages: vec![],
        };
        f.service
            .mark_completed(task.id, MetricMap::new(), summary)
            .await
            .unwrap();
        assert_eq!(f.service.ready_preview(task.id).await.unwrap(), None);

        f.service.paths().ensure_dirs().await.unwrap();
        let path = f.service.processed_path(task.id);
        tokio::fs::write(&path, b"png").await.unwrap();
        assert_eq!(f.service.ready_preview(task.id).await.unwrap(), Some(path.clone()));

        // A requeued task hides the previous output until the new run completes.
        f.service.enqueue_task(task.id).await.unwrap();
        assert!(path.exists());
        assert_eq!(f.service.ready_preview(task.id).await.unwrap(), None);
    }
}
