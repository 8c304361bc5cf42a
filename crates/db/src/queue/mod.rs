//! FIFO work queue of task ids.
//!
//! The queue carries plain string tokens: task ids, plus the worker's
//! shutdown sentinel which is pushed at the head.

mod memory_queue;
mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory_queue::MemoryTaskQueue;
pub use redis_queue::RedisTaskQueue;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append at the tail.
    async fn push(&self, token: &str) -> Result<(), StoreError>;

    /// Prepend at the head so the token is popped next.
    async fn push_front(&self, token: &str) -> Result<(), StoreError>;

    /// Pop the head without waiting.
    async fn pop(&self) -> Result<Option<String>, StoreError>;

    /// Pop the head, waiting up to `timeout` for an item to arrive.
    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<String>, StoreError>;

    async fn len(&self) -> Result<u64, StoreError>;

    /// Drop every occurrence of `token`; returns how many were removed.
    async fn remove(&self, token: &str) -> Result<u64, StoreError>;
}
