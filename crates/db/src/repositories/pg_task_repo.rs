//! Repository for the `tasks` table.

use async_trait::async_trait;
use relaize_core::task::{TaskDetail, TaskStatus};
use relaize_core::types::{TaskId, Timestamp};
use sqlx::{FromRow, PgPool};

use super::TaskRepo;
use crate::error::StoreError;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, filename, size, content_type, status, created_at, updated_at, \
    source_url, preview_url, processed_at, metrics, adjustments, pipeline, message";

/// A row from the `tasks` table.
#[derive(Debug, FromRow)]
struct TaskRow {
    id: TaskId,
    filename: String,
    size: Option<i64>,
    content_type: Option<String>,
    status: String,
    created_at: Timestamp,
    updated_at: Timestamp,
    source_url: Option<String>,
    preview_url: Option<String>,
    processed_at: Option<Timestamp>,
    metrics: Option<serde_json::Value>,
    adjustments: Option<serde_json::Value>,
    pipeline: Option<serde_json::Value>,
    message: Option<String>,
}

impl TryFrom<TaskRow> for TaskDetail {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |reason: String| StoreError::Corrupt {
            id: id.to_string(),
            reason,
        };
        let status = TaskStatus::parse(&row.status).map_err(|e| corrupt(e.to_string()))?;

        Ok(TaskDetail {
            id: row.id,
            filename: row.filename,
            size: row.size.and_then(|s| u64::try_from(s).ok()),
            content_type: row.content_type,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            source_url: row.source_url,
            preview_url: row.preview_url,
            processed_at: row.processed_at,
            metrics: from_json(row.metrics).map_err(|e| corrupt(e.to_string()))?,
            adjustments: from_json(row.adjustments).map_err(|e| corrupt(e.to_string()))?,
            pipeline: from_json(row.pipeline).map_err(|e| corrupt(e.to_string()))?,
            message: row.message,
        })
    }
}

fn from_json<T: serde::de::DeserializeOwned>(
    value: Option<serde_json::Value>,
) -> Result<Option<T>, serde_json::Error> {
    value.map(serde_json::from_value).transpose()
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<serde_json::Value>, StoreError> {
    Ok(value.as_ref().map(serde_json::to_value).transpose()?)
}

/// Task records in Postgres.
///
/// Ordering uses `created_at DESC, id DESC` so pages are stable when two
/// uploads share a timestamp.
#[derive(Clone)]
pub struct PgTaskRepo {
    pool: PgPool,
}

impl PgTaskRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert `task` unless a row with its id already exists.
    ///
    /// Returns `true` when a row was written.
    pub async fn insert_if_absent(&self, task: &TaskDetail) -> Result<bool, StoreError> {
        let query = format!(
            "INSERT INTO tasks ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO NOTHING"
        );
        let result = bind_task(sqlx::query(&query), task)?
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

/// Bind every column of `task` in `COLUMNS` order.
fn bind_task<'q>(query: PgQuery<'q>, task: &'q TaskDetail) -> Result<PgQuery<'q>, StoreError> {
    Ok(query
        .bind(task.id)
        .bind(&task.filename)
        .bind(task.size.and_then(|s| i64::try_from(s).ok()))
        .bind(&task.content_type)
        .bind(task.status.as_str())
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(&task.source_url)
        .bind(&task.preview_url)
        .bind(task.processed_at)
        .bind(to_json(&task.metrics)?)
        .bind(to_json(&task.adjustments)?)
        .bind(to_json(&task.pipeline)?)
        .bind(&task.message))
}

#[async_trait]
impl TaskRepo for PgTaskRepo {
    async fn save(&self, task: &TaskDetail) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO tasks ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE SET \
                 filename = EXCLUDED.filename, size = EXCLUDED.size, \
                 content_type = EXCLUDED.content_type, status = EXCLUDED.status, \
                 updated_at = EXCLUDED.updated_at, source_url = EXCLUDED.source_url, \
                 preview_url = EXCLUDED.preview_url, processed_at = EXCLUDED.processed_at, \
                 metrics = EXCLUDED.metrics, adjustments = EXCLUDED.adjustments, \
                 pipeline = EXCLUDED.pipeline, message = EXCLUDED.message"
        );
        bind_task(sqlx::query(&query), task)?
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskDetail>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query_as::<_, TaskRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskDetail::try_from).transpose()
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<TaskDetail>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             ORDER BY created_at DESC, id DESC \
             LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&query)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TaskDetail::try_from).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn all_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let ids: Vec<(TaskId,)> =
            sqlx::query_as("SELECT id FROM tasks ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
