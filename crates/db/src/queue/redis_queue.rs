use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;
use tokio::sync::Mutex;

use super::TaskQueue;
use crate::error::StoreError;
use crate::keys;

/// Extra time the blocking connection waits for a reply beyond the
/// `BLPOP` timeout itself.
const BLOCKING_REPLY_GRACE: Duration = Duration::from_secs(5);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The `tasks:queue` Redis list.
///
/// `BLPOP` runs on its own connection so a waiting worker never delays
/// commands issued by request handlers.
pub struct RedisTaskQueue {
    client: redis::Client,
    conn: ConnectionManager,
    blocking: Mutex<Option<MultiplexedConnection>>,
    max_block: Duration,
}

impl RedisTaskQueue {
    /// `max_block` is the longest timeout that will be passed to
    /// [`blocking_pop`](TaskQueue::blocking_pop).
    pub async fn connect(client: &redis::Client, max_block: Duration) -> Result<Self, StoreError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client: client.clone(),
            conn,
            blocking: Mutex::new(None),
            max_block,
        })
    }

    async fn blocking_connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let conn = self
            .client
            .get_multiplexed_async_connection_with_timeouts(
                self.max_block + BLOCKING_REPLY_GRACE,
                CONNECT_TIMEOUT,
            )
            .await?;
        Ok(conn)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn push(&self, token: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(keys::TASK_QUEUE, token).await?;
        Ok(())
    }

    async fn push_front(&self, token: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(keys::TASK_QUEUE, token).await?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.lpop(keys::TASK_QUEUE, None).await?)
    }

    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut slot = self.blocking.lock().await;
        let mut conn = match slot.clone() {
            Some(conn) => conn,
            None => {
                let conn = self.blocking_connection().await?;
                *slot = Some(conn.clone());
                conn
            }
        };

        let popped: Result<Option<(String, String)>, redis::RedisError> = conn
            .blpop(keys::TASK_QUEUE, timeout.min(self.max_block).as_secs_f64())
            .await;
        match popped {
            Ok(item) => Ok(item.map(|(_, token)| token)),
            Err(e) => {
                // Reconnect on the next call.
                *slot = None;
                Err(e.into())
            }
        }
    }

    async fn len(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(keys::TASK_QUEUE).await?)
    }

    async fn remove(&self, token: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.lrem(keys::TASK_QUEUE, 0, token).await?)
    }
}
