use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::TaskQueue;
use crate::error::StoreError;

/// Process-local queue for development and tests.
#[derive(Default)]
pub struct MemoryTaskQueue {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current queue contents, head first.
    pub async fn snapshot(&self) -> Vec<String> {
        self.items.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn push(&self, token: &str) -> Result<(), StoreError> {
        self.items.lock().await.push_back(token.to_string());
        self.notify.notify_one();
        Ok(())
    }

    async fn push_front(&self, token: &str) -> Result<(), StoreError> {
        self.items.lock().await.push_front(token.to_string());
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Result<Option<String>, StoreError> {
        Ok(self.items.lock().await.pop_front())
    }

    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(token) = self.items.lock().await.pop_front() {
                return Ok(Some(token));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> Result<u64, StoreError> {
        Ok(self.items.lock().await.len() as u64)
    }

    async fn remove(&self, token: &str) -> Result<u64, StoreError> {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|item| item != token);
        Ok((before - items.len()) as u64)
    }
}
