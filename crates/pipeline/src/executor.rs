//! The interface every model wrapper implements.

use std::path::Path;

use async_trait::async_trait;
use relaize_core::adjustments::AdjustmentPayload;
use relaize_core::catalog::ModelSpec;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::PipelineConfig;
use crate::error::StageError;

/// Task-level inputs shared by every stage of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageContext {
    pub target_scale: Option<f64>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub mask_data: Option<String>,
    pub face_fidelity: Option<f64>,
    pub face_provider: Option<String>,
}

impl StageContext {
    /// Merge the task's adjustments with the configured face restoration
    /// defaults.
    pub fn from_adjustments(adjustments: Option<&AdjustmentPayload>, config: &PipelineConfig) -> Self {
        let Some(adj) = adjustments else {
            return Self {
                face_fidelity: Some(config.face_restore_fidelity),
                face_provider: Some(config.face_restore_provider.clone()),
                ..Default::default()
            };
        };
        Self {
            target_scale: adj.effective_target_scale(),
            prompt: adj.prompt.clone(),
            negative_prompt: adj.negative_prompt.clone(),
            mask_data: adj.mask_data.clone(),
            face_fidelity: Some(adj.face_restore_fidelity.unwrap_or(config.face_restore_fidelity)),
            face_provider: Some(
                adj.face_restore_provider
                    .clone()
                    .unwrap_or_else(|| config.face_restore_provider.clone()),
            ),
        }
    }
}

/// One model invocation: read `input`, write `output`.
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    pub model: &'a ModelSpec,
    pub input: &'a Path,
    pub output: &'a Path,
    pub params: &'a Map<String, Value>,
    pub context: &'a StageContext,
}

impl StageRequest<'_> {
    /// Upscale factor: the task's target scale, else the stage's `scale`
    /// parameter.
    pub fn scale(&self) -> Option<f64> {
        self.context
            .target_scale
            .or_else(|| self.params.get("scale").and_then(Value::as_f64))
            .filter(|s| *s > 0.0)
    }
}

/// Runs one kind of model.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Produce `request.output` from `request.input`.
    ///
    /// Returns [`StageError::NotConfigured`] when the model cannot run in
    /// this deployment.
    async fn run(&self, request: StageRequest<'_>) -> Result<(), StageError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
