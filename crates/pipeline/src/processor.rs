//! Turns an uploaded image into a restored PNG plus before/after metrics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use relaize_core::adjustments::AdjustmentPayload;
use relaize_core::metrics::{compare, MetricMap, QualityScores};
use relaize_core::task::PipelineRunSummary;

use crate::error::PipelineError;
use crate::metrics::quality_scores;
use crate::runner::PipelineRunner;

/// Result of [`ImageProcessor::enhance_image`].
#[derive(Debug, Clone)]
pub struct EnhanceOutcome {
    pub metrics: MetricMap,
    pub pipeline: PipelineRunSummary,
}

#[derive(Clone)]
pub struct ImageProcessor {
    runner: Arc<PipelineRunner>,
}

fn decode(path: &Path) -> Result<DynamicImage, PipelineError> {
    image::open(path).map_err(|source| PipelineError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Scratch directory for one run, next to the destination file.
fn work_dir_for(destination: &Path) -> PathBuf {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    parent.join(".work").join(uuid::Uuid::new_v4().to_string())
}

impl ImageProcessor {
    pub fn new(runner: Arc<PipelineRunner>) -> Self {
        Self { runner }
    }

    /// Run the restoration pipeline on `source` and write the result to
    /// `destination` as PNG.
    ///
    /// Metrics compare the decoded source with the written result.
    pub async fn enhance_image(
        &self,
        source: &Path,
        destination: &Path,
        adjustments: Option<&AdjustmentPayload>,
    ) -> Result<EnhanceOutcome, PipelineError> {
        let source_owned = source.to_path_buf();
        let before: QualityScores =
            tokio::task::spawn_blocking(move || decode(&source_owned).map(|img| quality_scores(&img)))
                .await??;

        let work_dir = work_dir_for(destination);
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self
            .finish_run(source, destination, &work_dir, adjustments)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            tracing::warn!(path = %work_dir.display(), error = %e, "Failed to remove work directory");
        }

        let (after, pipeline) = result?;
        Ok(EnhanceOutcome {
            metrics: compare(&before, &after),
            pipeline,
        })
    }

    async fn finish_run(
        &self,
        source: &Path,
        destination: &Path,
        work_dir: &Path,
        adjustments: Option<&AdjustmentPayload>,
    ) -> Result<(QualityScores, PipelineRunSummary), PipelineError> {
        let outcome = self.runner.run(source, work_dir, adjustments).await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let final_image = outcome.output;
        let destination = destination.to_path_buf();
        let after = tokio::task::spawn_blocking(move || -> Result<QualityScores, PipelineError> {
            let img = decode(&final_image)?;
            img.save_with_format(&destination, ImageFormat::Png)?;
            Ok(quality_scores(&img))
        })
        .await??;

        Ok((after, outcome.summary))
    }
}
