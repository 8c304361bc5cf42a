//! Image quality scores and before/after comparison.
//!
//! The raw pixel statistics are gathered by the pipeline crate; this module
//! turns them into the scores shown on the comparison page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metric name → before/after comparison, ordered by name.
pub type MetricMap = BTreeMap<String, MetricDelta>;

pub const METRIC_UIQM: &str = "uiqm";
pub const METRIC_UCIQE: &str = "uciqe";
pub const METRIC_ENTROPY: &str = "entropy";
pub const METRIC_CLARITY: &str = "clarity";

/// Clarity is capped so a noisy upscale cannot dominate the report.
pub const MAX_CLARITY: f64 = 100.0;

/// A single metric measured on the source and on the restored image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub before: f64,
    pub after: f64,
    pub delta: f64,
}

/// Normalized pixel statistics of one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    /// Mean gray level in `0.0..=1.0`.
    pub brightness: f64,
    /// Gray standard deviation divided by 64.
    pub contrast: f64,
    /// Mean HSV saturation in `0.0..=1.0`.
    pub saturation: f64,
    /// Variance of the 3x3 Laplacian of the gray image.
    pub laplacian_variance: f64,
    /// Shannon entropy (bits) of the 256-bin gray histogram.
    pub entropy: f64,
}

/// Derived quality scores for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScores {
    pub uiqm: f64,
    pub uciqe: f64,
    pub entropy: f64,
    pub clarity: f64,
}

impl QualityScores {
    pub fn from_stats(stats: &ImageStats) -> Self {
        Self {
            uiqm: round2(2.0 + stats.brightness * 2.5 + stats.saturation * 1.5),
            uciqe: round2(0.4 + stats.contrast * 0.4 + stats.saturation * 0.2),
            entropy: round2(stats.entropy),
            clarity: round2((stats.laplacian_variance / 5.0).min(MAX_CLARITY)),
        }
    }

    fn entries(&self) -> [(&'static str, f64); 4] {
        [
            (METRIC_UIQM, self.uiqm),
            (METRIC_UCIQE, self.uciqe),
            (METRIC_ENTROPY, self.entropy),
            (METRIC_CLARITY, self.clarity),
        ]
    }
}

/// Pair up scores of the source and restored image.
pub fn compare(before: &QualityScores, after: &QualityScores) -> MetricMap {
    before
        .entries()
        .into_iter()
        .zip(after.entries())
        .map(|((name, b), (_, a))| {
            (
                name.to_string(),
                MetricDelta {
                    before: round2(b),
                    after: round2(a),
                    delta: round2(a - b),
                },
            )
        })
        .collect()
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
