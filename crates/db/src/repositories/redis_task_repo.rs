use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use relaize_core::task::TaskDetail;
use relaize_core::types::TaskId;

use super::TaskRepo;
use crate::error::StoreError;
use crate::keys;

/// Tasks stored as JSON blobs under `tasks:data:<id>` with a
/// `tasks:index` sorted set scored by `created_at`.
#[derive(Clone)]
pub struct RedisTaskRepo {
    conn: ConnectionManager,
}

impl RedisTaskRepo {
    pub async fn connect(client: &redis::Client) -> Result<Self, StoreError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { conn })
    }

    fn decode(id: &str, raw: &str) -> Result<TaskDetail, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Index score: creation time as fractional unix seconds.
fn index_score(task: &TaskDetail) -> f64 {
    task.created_at.timestamp_millis() as f64 / 1000.0
}

#[async_trait]
impl TaskRepo for RedisTaskRepo {
    async fn save(&self, task: &TaskDetail) -> Result<(), StoreError> {
        let json = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .set(keys::task_data(task.id), json)
            .ignore()
            .zadd(keys::TASK_INDEX, task.id.to_string(), index_score(task))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskDetail>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(keys::task_data(id)).await?;
        raw.map(|raw| Self::decode(&id.to_string(), &raw))
            .transpose()
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<TaskDetail>, StoreError> {
        let Some((start, stop)) = index_range(offset, limit) else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrevrange(keys::TASK_INDEX, start, stop).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let data_keys: Vec<String> = ids.iter().map(keys::task_data).collect();
        let blobs: Vec<Option<String>> = conn.mget(&data_keys).await?;

        let mut tasks = Vec::with_capacity(blobs.len());
        for (id, blob) in ids.iter().zip(blobs) {
            match blob {
                Some(raw) => tasks.push(Self::decode(id, &raw)?),
                None => tracing::warn!(task_id = %id, "Indexed task has no data blob; skipping"),
            }
        }
        Ok(tasks)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(keys::TASK_INDEX).await?)
    }

    async fn all_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.zrevrange(keys::TASK_INDEX, 0, -1).await?;
        Ok(raw
            .into_iter()
            .filter_map(|id| match id.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(member = %id, "Ignoring non-uuid member of task index");
                    None
                }
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Inclusive `ZREVRANGE` bounds for a page.
///
/// `None` for an empty page or an offset past any possible index; Redis
/// would read a negative start as counting from the end.
fn index_range(offset: u64, limit: u64) -> Option<(isize, isize)> {
    if limit == 0 {
        return None;
    }
    let start = isize::try_from(offset).ok()?;
    let stop = offset.saturating_add(limit - 1).min(isize::MAX as u64) as isize;
    Some((start, stop))
}
