//! Backend selection for the task store.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::queue::{MemoryTaskQueue, RedisTaskQueue, TaskQueue};
use crate::repositories::{MemoryTaskRepo, PgTaskRepo, RedisTaskRepo, TaskRepo};

/// Where task records live. The queue is always Redis except for
/// [`TaskBackend::Memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskBackend {
    Redis,
    Postgres,
    Memory,
}

impl TaskBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Some(Self::Redis),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Task store configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: TaskBackend,
    pub redis_url: String,
    pub database_url: Option<String>,
    /// Upper bound for a single blocking queue pop.
    pub pop_timeout: Duration,
}

impl StoreConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `TASK_BACKEND`            | `redis`                    |
    /// | `REDIS_URL`               | `redis://127.0.0.1:6379/0` |
    /// | `DATABASE_URL`            | unset                      |
    /// | `WORKER_POP_TIMEOUT_SECS` | `5`                        |
    pub fn from_env() -> Self {
        let backend = std::env::var("TASK_BACKEND")
            .ok()
            .map(|v| TaskBackend::parse(&v).expect("TASK_BACKEND must be redis, postgres or memory"))
            .unwrap_or(TaskBackend::Redis);

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".into());

        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let pop_timeout_secs: u64 = std::env::var("WORKER_POP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("WORKER_POP_TIMEOUT_SECS must be a valid u64");

        Self {
            backend,
            redis_url,
            database_url,
            pop_timeout: Duration::from_secs(pop_timeout_secs.max(1)),
        }
    }

    /// In-memory store, used by tests.
    pub fn memory() -> Self {
        Self {
            backend: TaskBackend::Memory,
            redis_url: String::new(),
            database_url: None,
            pop_timeout: Duration::from_secs(5),
        }
    }
}

/// Open the repository and queue described by `config`.
///
/// The Postgres backend runs pending migrations before returning.
pub async fn connect_store(
    config: &StoreConfig,
) -> Result<(Arc<dyn TaskRepo>, Arc<dyn TaskQueue>), StoreError> {
    match config.backend {
        TaskBackend::Memory => {
            tracing::warn!("Using in-memory task store; tasks are lost on restart");
            Ok((
                Arc::new(MemoryTaskRepo::new()),
                Arc::new(MemoryTaskQueue::new()),
            ))
        }
        TaskBackend::Redis => {
            let client = redis::Client::open(config.redis_url.as_str())?;
            let repo = RedisTaskRepo::connect(&client).await?;
            let queue = RedisTaskQueue::connect(&client, config.pop_timeout).await?;
            tracing::info!("Task store connected (redis)");
            Ok((Arc::new(repo), Arc::new(queue)))
        }
        TaskBackend::Postgres => {
            let database_url = config.database_url.as_deref().ok_or_else(|| {
                relaize_core::error::CoreError::Validation(
                    "DATABASE_URL is required when TASK_BACKEND=postgres".to_string(),
                )
            })?;
            let pool = crate::create_pool(database_url).await?;
            crate::run_migrations(&pool).await?;

            let client = redis::Client::open(config.redis_url.as_str())?;
            let queue = RedisTaskQueue::connect(&client, config.pop_timeout).await?;
            tracing::info!("Task store connected (postgres records, redis queue)");
            Ok((Arc::new(PgTaskRepo::new(pool)), Arc::new(queue)))
        }
    }
}
