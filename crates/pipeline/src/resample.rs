//! Built-in super-resolution fallback.
//!
//! Plain Lanczos upscaling. It does not restore detail the way the neural
//! models do, but keeps the super-resolution pipelines usable on hosts
//! without the Final2x environment.

use std::path::PathBuf;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::ImageFormat;

use crate::error::StageError;
use crate::executor::{StageExecutor, StageRequest};

/// Scale used when neither the task nor the stage names one.
pub const DEFAULT_SCALE: f64 = 2.0;

/// Largest width or height the resampler will produce.
pub const MAX_OUTPUT_DIMENSION: u32 = 16_384;

#[derive(Debug, Default, Clone, Copy)]
pub struct ResampleExecutor;

/// The largest scale not above `scale` that keeps both sides within
/// [`MAX_OUTPUT_DIMENSION`].
pub fn fit_scale(width: u32, height: u32, scale: f64) -> f64 {
    let longest = f64::from(width.max(height).max(1));
    scale.min(f64::from(MAX_OUTPUT_DIMENSION) / longest)
}

/// Output dimensions for `scale`, at least one pixel per side.
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let max = f64::from(MAX_OUTPUT_DIMENSION);
    let w = (f64::from(width) * scale).round().clamp(1.0, max);
    let h = (f64::from(height) * scale).round().clamp(1.0, max);
    (w as u32, h as u32)
}

fn resample(input: PathBuf, output: PathBuf, scale: f64) -> Result<(), StageError> {
    let img = image::open(&input)?;
    let fitted = fit_scale(img.width(), img.height(), scale);
    if fitted < scale {
        tracing::warn!(
            width = img.width(),
            height = img.height(),
            requested = scale,
            applied = fitted,
            max_dimension = MAX_OUTPUT_DIMENSION,
            "Lowering upscale factor to fit the output size limit"
        );
    }
    let (w, h) = scaled_dimensions(img.width(), img.height(), fitted);
    let resized = img.resize_exact(w, h, FilterType::Lanczos3);
    resized.save_with_format(&output, ImageFormat::Png)?;
    Ok(())
}

#[async_trait]
impl StageExecutor for ResampleExecutor {
    async fn run(&self, request: StageRequest<'_>) -> Result<(), StageError> {
        let scale = request.scale().unwrap_or(DEFAULT_SCALE);
        let input: PathBuf = request.input.into();
        let output: PathBuf = request.output.into();

        tracing::debug!(model_id = %request.model.id, scale, "Resampling with Lanczos fallback");
        tokio::task::spawn_blocking(move || resample(input, output, scale))
            .await
            .map_err(|e| StageError::Io(std::io::Error::other(e)))?
    }

    fn name(&self) -> &'static str {
        "resample"
    }
}
