//! Quality report generated from a finished task's metrics.

use serde::Serialize;

use crate::error::CoreError;
use crate::metrics::{MetricMap, METRIC_CLARITY, METRIC_ENTROPY, METRIC_UCIQE, METRIC_UIQM};
use crate::task::TaskDetail;
use crate::types::{TaskId, Timestamp};

/// One metric row of a report section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPair {
    pub name: String,
    pub before: f64,
    pub after: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSection {
    pub title: String,
    pub summary: String,
    pub metrics: Vec<MetricPair>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub task_id: TaskId,
    pub generated_at: Timestamp,
    pub overview: String,
    pub sections: Vec<ReportSection>,
    pub recommendations: Vec<String>,
}

/// Build the comparison report for `task`.
///
/// Fails with `Conflict` when the task has no metrics yet (it has not
/// completed a processing run).
pub fn build_report(task: &TaskDetail) -> Result<ReportResponse, CoreError> {
    let metrics = task
        .metrics
        .as_ref()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            CoreError::Conflict(format!(
                "Report for task {} is not available until processing completes",
                task.id
            ))
        })?;

    let pairs: Vec<MetricPair> = metrics
        .iter()
        .map(|(name, m)| MetricPair {
            name: name.to_uppercase(),
            before: m.before,
            after: m.after,
            delta: m.delta,
        })
        .collect();

    let improved = pairs.iter().filter(|p| p.delta > 0.0).count();

    let pipeline_note = task
        .pipeline
        .as_ref()
        .map(|p| format!(" using the '{}' pipeline", p.pipeline_name))
        .unwrap_or_default();

    Ok(ReportResponse {
        task_id: task.id,
        generated_at: chrono::Utc::now(),
        overview: format!(
            "Restoration report for {}{pipeline_note}",
            task.filename
        ),
        sections: vec![ReportSection {
            title: "Quantitative metrics".to_string(),
            summary: format!(
                "{improved} of {} quality metrics improved after restoration.",
                pairs.len()
            ),
            metrics: pairs,
        }],
        recommendations: recommendations(metrics),
    })
}

/// Suggestions derived from which metrics moved in the wrong direction.
fn recommendations(metrics: &MetricMap) -> Vec<String> {
    let delta = |name: &str| metrics.get(name).map(|m| m.delta);
    let mut out = Vec::new();

    if delta(METRIC_CLARITY).is_some_and(|d| d < 0.0) {
        out.push(
            "Clarity dropped; try a sharper super-resolution model or lower smoothing in manual mode."
                .to_string(),
        );
    }
    if delta(METRIC_UIQM).is_some_and(|d| d < 0.0) || delta(METRIC_UCIQE).is_some_and(|d| d < 0.0)
    {
        out.push(
            "Color quality decreased; consider the 'haze' or 'night' preset for this scene."
                .to_string(),
        );
    }
    if delta(METRIC_ENTROPY).is_some_and(|d| d < 0.0) {
        out.push("Detail entropy fell; check for over-smoothing or over-enhancement.".to_string());
    }
    if out.is_empty() {
        out.push("Restoration is stable and suitable for downstream analysis.".to_string());
        out.push(
            "If the result looks over-enhanced, lower the sharpening parameters in manual mode."
                .to_string(),
        );
    }
    out
}
