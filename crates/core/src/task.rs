//! Task records and the task status state machine.
//!
//! A task is created for every uploaded image. The frontend polls the record
//! while the worker moves it through
//! `pending -> processing -> completed | failed | cancelled`.

use serde::{Deserialize, Serialize};

use crate::adjustments::AdjustmentPayload;
use crate::error::CoreError;
use crate::metrics::MetricMap;
use crate::types::{TaskId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a restoration task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// The lowercase wire name (`"pending"`, `"processing"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a wire name back into a status.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid task status '{value}'. Must be one of: pending, processing, completed, failed, cancelled"
                ))
            })
    }

    /// Completed, failed and cancelled tasks are no longer worked on.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Re-asserting the current status is always allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        if self == next {
            return true;
        }
        match self {
            Pending => matches!(next, Processing | Cancelled),
            Processing => matches!(next, Completed | Failed | Cancelled),
            Completed | Failed | Cancelled => next == Pending,
        }
    }

    /// [`can_transition_to`](Self::can_transition_to) as a `Conflict` error.
    pub fn validate_transition(self, next: TaskStatus) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Cannot move task from '{}' to '{}'",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pipeline run summary
// ---------------------------------------------------------------------------

/// How a single pipeline stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Executed,
    Skipped,
    Error,
}

/// Timing and outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage_id: String,
    pub stage_name: String,
    pub model_id: String,
    pub model_label: String,
    pub status: StageStatus,
    pub duration_ms: f64,
    pub message: Option<String>,
}

/// Per-stage record of a pipeline run, stored on the task once it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunSummary {
    pub pipeline_id: String,
    pub pipeline_name: String,
    pub stages: Vec<StageRecord>,
}

// ---------------------------------------------------------------------------
// Task records
// ---------------------------------------------------------------------------

/// Full task record as persisted in the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub id: TaskId,
    pub filename: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub status: TaskStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub source_url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub processed_at: Option<Timestamp>,
    #[serde(default)]
    pub metrics: Option<MetricMap>,
    #[serde(default)]
    pub adjustments: Option<AdjustmentPayload>,
    #[serde(default)]
    pub pipeline: Option<PipelineRunSummary>,
    #[serde(default)]
    pub message: Option<String>,
}

/// List view of a task (everything except the status message).
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub filename: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub status: TaskStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub source_url: Option<String>,
    pub preview_url: Option<String>,
    pub processed_at: Option<Timestamp>,
    pub metrics: Option<MetricMap>,
    pub adjustments: Option<AdjustmentPayload>,
}

/// Partial update. Only the fields that are `Some` are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub metrics: Option<MetricMap>,
    pub message: Option<String>,
    pub processed_at: Option<Timestamp>,
    pub adjustments: Option<AdjustmentPayload>,
    pub preview_url: Option<String>,
    pub pipeline: Option<PipelineRunSummary>,
}

impl TaskDetail {
    /// A freshly uploaded task waiting in the queue.
    pub fn new_pending(
        id: TaskId,
        filename: impl Into<String>,
        size: Option<u64>,
        content_type: Option<String>,
        source_url: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            filename: filename.into(),
            size,
            content_type,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            source_url,
            preview_url: None,
            processed_at: None,
            metrics: None,
            adjustments: None,
            pipeline: None,
            message: None,
        }
    }

    /// Merge `update` into this record and bump `updated_at`.
    ///
    /// Fails with `Conflict` when the status change is not a legal
    /// transition; the record is left untouched in that case.
    pub fn apply(&mut self, update: TaskUpdate) -> Result<(), CoreError> {
        if let Some(status) = update.status {
            self.status.validate_transition(status)?;
            self.status = status;
        }
        if let Some(metrics) = update.metrics {
            self.metrics = Some(metrics);
        }
        if let Some(message) = update.message {
            self.message = Some(message);
        }
        if let Some(processed_at) = update.processed_at {
            self.processed_at = Some(processed_at);
        }
        if let Some(adjustments) = update.adjustments {
            self.adjustments = Some(adjustments);
        }
        if let Some(preview_url) = update.preview_url {
            self.preview_url = Some(preview_url);
        }
        if let Some(pipeline) = update.pipeline {
            self.pipeline = Some(pipeline);
        }
        self.updated_at = chrono::Utc::now();
        Ok(())
    }
}

impl From<TaskDetail> for TaskSummary {
    fn from(task: TaskDetail) -> Self {
        Self {
            id: task.id,
            filename: task.filename,
            size: task.size,
            content_type: task.content_type,
            status: task.status,
            created_at: task.created_at,
            updated_at: task.updated_at,
            source_url: task.source_url,
            preview_url: task.preview_url,
            processed_at: task.processed_at,
            metrics: task.metrics,
            adjustments: task.adjustments,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
