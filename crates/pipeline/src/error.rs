use std::path::PathBuf;

/// Failure of a single model stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// No executor can run this stage in the current deployment. Optional
    /// stages are skipped on this error; required stages fail the run.
    #[error("{0}")]
    NotConfigured(String),

    #[error("Model process timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Model process failed with exit code {exit_code}: {stderr}")]
    ExecutionFailed { exit_code: i32, stderr: String },

    #[error("Model did not write its output to {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("Invalid stage parameters: {0}")]
    InvalidParams(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a whole processing run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Required stage '{stage}' was skipped: {reason}")]
    RequiredStageSkipped { stage: String, reason: String },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("Unable to read image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image worker thread failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
