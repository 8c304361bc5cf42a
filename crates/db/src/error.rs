use relaize_core::error::CoreError;

/// Failure of a task store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Domain error raised while applying an operation (not found,
    /// validation, illegal transition).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be turned back into a task.
    #[error("Corrupt task record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}
