//! Restoration pipeline: model stage executors, the stage runner and the
//! image quality metrics computed around a run.

pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod processor;
pub mod registry;
pub mod resample;
pub mod runner;
pub mod script;
pub mod subprocess;

pub use config::PipelineConfig;
pub use error::{PipelineError, StageError};
pub use executor::{StageContext, StageExecutor, StageRequest};
pub use processor::{EnhanceOutcome, ImageProcessor};
pub use registry::ExecutorRegistry;
pub use runner::{PipelineOutcome, PipelineRunner};
