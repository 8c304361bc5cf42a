//! Task record repositories.
//!
//! Every backend stores complete [`TaskDetail`] records plus an index
//! ordered by creation time. Status rules are enforced above this layer by
//! [`TaskService`](crate::service::TaskService).

mod memory_task_repo;
mod pg_task_repo;
mod redis_task_repo;

use async_trait::async_trait;
use relaize_core::task::TaskDetail;
use relaize_core::types::TaskId;

use crate::error::StoreError;

pub use memory_task_repo::MemoryTaskRepo;
pub use pg_task_repo::PgTaskRepo;
pub use redis_task_repo::RedisTaskRepo;

#[async_trait]
pub trait TaskRepo: Send + Sync {
    /// Insert or overwrite a record and its index entry.
    async fn save(&self, task: &TaskDetail) -> Result<(), StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<TaskDetail>, StoreError>;

    /// A page of records, newest first.
    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<TaskDetail>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Every indexed id, newest first.
    async fn all_ids(&self) -> Result<Vec<TaskId>, StoreError>;

    /// Round-trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Short name for logs and the health endpoint.
    fn backend_name(&self) -> &'static str;
}
