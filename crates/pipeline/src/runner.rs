//! Runs a catalog pipeline stage by stage.
//!
//! Each stage reads the previous stage's output file and writes a new PNG
//! into the run's work directory. A stage whose executor reports
//! `NotConfigured` is skipped when optional and fails the run when
//! required; any other stage error fails the run immediately.

use std::path::{Path, PathBuf};
use std::time::Instant;

use relaize_core::adjustments::AdjustmentPayload;
use relaize_core::catalog::{self, PipelineSpec, PipelineStageSpec, FACE_STAGE_ID, KIND_SUPERRES};
use relaize_core::metrics::round2;
use relaize_core::task::{PipelineRunSummary, StageRecord, StageStatus};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, StageError};
use crate::executor::{StageContext, StageRequest};
use crate::registry::ExecutorRegistry;

/// Final image of a successful run plus its per-stage record.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Output of the last executed stage, or the input when every stage
    /// was skipped.
    pub output: PathBuf,
    pub summary: PipelineRunSummary,
}

pub struct PipelineRunner {
    registry: ExecutorRegistry,
    config: PipelineConfig,
}

impl PipelineRunner {
    pub fn new(registry: ExecutorRegistry, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self::new(ExecutorRegistry::from_config(&config), config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The pipeline and the stages to run for `adjustments`.
    pub fn plan(&self, adjustments: Option<&AdjustmentPayload>) -> (&'static PipelineSpec, Vec<PipelineStageSpec>) {
        let requested = adjustments.and_then(|a| a.pipeline_id.as_deref());
        let (pipeline, fell_back) = catalog::resolve_pipeline(requested);
        if fell_back {
            tracing::warn!(
                requested = requested.unwrap_or_default(),
                fallback = %pipeline.id,
                "Unknown pipeline; using the default",
            );
        }

        let mut stages = pipeline.stages.clone();
        let wants_face = adjustments
            .and_then(|a| a.face_restore_enabled)
            .unwrap_or(self.config.face_restore_enabled);
        if wants_face && !stages.iter().any(|s| s.id == FACE_STAGE_ID) {
            stages.push(PipelineStageSpec::face_restore());
        }
        (pipeline, stages)
    }

    /// Run the pipeline chosen by `adjustments` on `input`.
    ///
    /// `work_dir` must exist; intermediate images are left there for the
    /// caller to clean up.
    pub async fn run(
        &self,
        input: &Path,
        work_dir: &Path,
        adjustments: Option<&AdjustmentPayload>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let (pipeline, stages) = self.plan(adjustments);
        let context = StageContext::from_adjustments(adjustments, &self.config);

        let mut current = input.to_path_buf();
        let mut records = Vec::with_capacity(stages.len());

        for (index, stage) in stages.iter().enumerate() {
            let model_id = stage_model(stage, adjustments);
            let output = work_dir.join(format!("{:02}-{}.png", index + 1, stage.id));

            let start = Instant::now();
            let result = self
                .run_stage(&model_id, stage, &current, &output, &context)
                .await;
            let duration_ms = round2(start.elapsed().as_secs_f64() * 1000.0);

            let record = |status, message| StageRecord {
                stage_id: stage.id.clone(),
                stage_name: stage.name.clone(),
                model_id: model_id.clone(),
                model_label: catalog::model(&model_id)
                    .map(|m| m.name.clone())
                    .unwrap_or_else(|| model_id.clone()),
                status,
                duration_ms,
                message,
            };

            match result {
                Ok(()) => {
                    tracing::info!(stage = %stage.id, model_id = %model_id, duration_ms, "Stage executed");
                    records.push(record(StageStatus::Executed, None));
                    current = output;
                }
                Err(StageError::NotConfigured(reason)) => {
                    tracing::warn!(stage = %stage.id, model_id = %model_id, reason = %reason, "Stage skipped");
                    records.push(record(StageStatus::Skipped, Some(reason.clone())));
                    if !stage.optional {
                        return Err(PipelineError::RequiredStageSkipped {
                            stage: stage.id.clone(),
                            reason,
                        });
                    }
                }
                Err(e) => {
                    tracing::error!(stage = %stage.id, model_id = %model_id, error = %e, "Stage failed");
                    return Err(PipelineError::Stage {
                        stage: stage.id.clone(),
                        source: e,
                    });
                }
            }
        }

        Ok(PipelineOutcome {
            output: current,
            summary: PipelineRunSummary {
                pipeline_id: pipeline.id.clone(),
                pipeline_name: pipeline.name.clone(),
                stages: records,
            },
        })
    }

    async fn run_stage(
        &self,
        model_id: &str,
        stage: &PipelineStageSpec,
        input: &Path,
        output: &Path,
        context: &StageContext,
    ) -> Result<(), StageError> {
        let model = catalog::model(model_id)
            .ok_or_else(|| StageError::NotConfigured(format!("Unknown model '{model_id}'")))?;
        let executor = self.registry.resolve(&model.kind)?;
        executor
            .run(StageRequest {
                model,
                input,
                output,
                params: &stage.defaults,
                context,
            })
            .await
    }
}

/// Model for `stage`: an explicit stage override, then the task's
/// super-resolution choice for super-resolution stages, then the stage
/// default.
pub fn stage_model(stage: &PipelineStageSpec, adjustments: Option<&AdjustmentPayload>) -> String {
    let Some(adj) = adjustments else {
        return stage.model_id.clone();
    };
    if let Some(model_id) = adj
        .pipeline_stage_overrides
        .as_ref()
        .and_then(|o| o.get(&stage.id))
    {
        return model_id.clone();
    }
    if catalog::is_model_of_kind(&stage.model_id, KIND_SUPERRES) {
        if let Some(model_id) = adj.effective_superres_model() {
            return model_id.to_string();
        }
    }
    stage.model_id.clone()
}
