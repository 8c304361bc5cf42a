//! Task Store: task records, the FIFO work queue and the service that ties
//! them to the upload/processed storage directories.

pub mod backend;
pub mod error;
pub mod keys;
pub mod queue;
pub mod repositories;
pub mod service;

use sqlx::postgres::PgPoolOptions;

pub use backend::{connect_store, StoreConfig, TaskBackend};
pub use error::StoreError;
pub use queue::{MemoryTaskQueue, RedisTaskQueue, TaskQueue};
pub use repositories::{MemoryTaskRepo, PgTaskRepo, RedisTaskRepo, TaskRepo};
pub use service::{ListTasksQuery, StoragePaths, TaskService};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations under `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
