//! User-supplied enhancement parameters attached to a task.
//!
//! The payload is stored verbatim on the task record and read back by the
//! pipeline runner when the task is (re)processed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{self, KIND_SUPERRES};
use crate::error::CoreError;

/* --------------------------------------------------------------------------
   Validation limits
   -------------------------------------------------------------------------- */

pub const MIN_TARGET_SCALE: f64 = 0.1;
pub const MAX_TARGET_SCALE: f64 = 8.0;

pub const MIN_FACE_FIDELITY: f64 = 0.0;
pub const MAX_FACE_FIDELITY: f64 = 1.0;

pub const FACE_PROVIDER_GFPGAN: &str = "gfpgan";
pub const FACE_PROVIDER_CODEFORMER: &str = "codeformer";

/// All face restoration providers understood by the face stage wrapper.
pub const VALID_FACE_PROVIDERS: &[&str] = &[FACE_PROVIDER_GFPGAN, FACE_PROVIDER_CODEFORMER];

/// Maximum length of the free-text note and prompts.
pub const MAX_TEXT_LEN: usize = 2000;

/// Keys of `parameters` that may carry a target scale, in priority order.
const SCALE_PARAMETER_KEYS: &[&str] = &["targetScale", "scale", "upscale"];

/* --------------------------------------------------------------------------
   Payload
   -------------------------------------------------------------------------- */

/// Enhancement parameters for a task (`POST /tasks/{id}/adjust`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentPayload {
    /// Free-form filter parameters from the adjustment page.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub preset_id: Option<String>,
    pub note: Option<String>,
    pub model_name: Option<String>,
    pub target_scale: Option<f64>,
    pub face_restore_enabled: Option<bool>,
    pub face_restore_provider: Option<String>,
    pub face_restore_fidelity: Option<f64>,
    pub pipeline_id: Option<String>,
    /// Stage id → model id replacing the stage's default model.
    pub pipeline_stage_overrides: Option<BTreeMap<String, String>>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    /// Mask image as a `data:image/...;base64,` URL.
    pub mask_data: Option<String>,
}

impl AdjustmentPayload {
    /// Check ranges and catalog references.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(scale) = self.target_scale {
            validate_target_scale(scale)?;
        }

        if let Some(fidelity) = self.face_restore_fidelity {
            if !(MIN_FACE_FIDELITY..=MAX_FACE_FIDELITY).contains(&fidelity) {
                return Err(CoreError::Validation(format!(
                    "face_restore_fidelity must be between {MIN_FACE_FIDELITY} and {MAX_FACE_FIDELITY}, got {fidelity}"
                )));
            }
        }

        if let Some(provider) = &self.face_restore_provider {
            if !VALID_FACE_PROVIDERS.contains(&provider.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Invalid face_restore_provider '{provider}'. Must be one of: {}",
                    VALID_FACE_PROVIDERS.join(", ")
                )));
            }
        }

        if let Some(model_id) = &self.model_name {
            if catalog::model(model_id).is_none() {
                return Err(CoreError::Validation(format!(
                    "Unknown model '{model_id}'"
                )));
            }
        }

        if let Some(preset_id) = &self.preset_id {
            if preset_id.trim().is_empty() {
                return Err(CoreError::Validation(
                    "preset_id must not be empty".to_string(),
                ));
            }
        }

        let pipeline = match &self.pipeline_id {
            Some(id) => Some(catalog::pipeline(id).ok_or_else(|| {
                CoreError::Validation(format!("Unknown pipeline '{id}'"))
            })?),
            None => None,
        };

        if let Some(overrides) = &self.pipeline_stage_overrides {
            let pipeline = pipeline.unwrap_or_else(catalog::default_pipeline);
            for (stage_id, model_id) in overrides {
                if !pipeline.stages.iter().any(|s| &s.id == stage_id) {
                    return Err(CoreError::Validation(format!(
                        "Pipeline '{}' has no stage '{stage_id}'",
                        pipeline.id
                    )));
                }
                if catalog::model(model_id).is_none() {
                    return Err(CoreError::Validation(format!(
                        "Unknown model '{model_id}' for stage '{stage_id}'"
                    )));
                }
            }
        }

        for (field, value) in [
            ("note", &self.note),
            ("prompt", &self.prompt),
            ("negative_prompt", &self.negative_prompt),
        ] {
            if let Some(text) = value {
                if text.len() > MAX_TEXT_LEN {
                    return Err(CoreError::Validation(format!(
                        "{field} too long: {} chars (max {MAX_TEXT_LEN})",
                        text.len()
                    )));
                }
            }
        }

        if let Some(mask) = &self.mask_data {
            validate_mask_data_url(mask)?;
        }

        Ok(())
    }

    /// Super-resolution model requested by the user: an explicit model
    /// first, otherwise the model tied to the chosen preset.
    pub fn effective_model(&self) -> Option<&str> {
        self.model_name
            .as_deref()
            .or_else(|| self.preset_id.as_deref().and_then(catalog::preset_model))
    }

    /// Same as [`effective_model`](Self::effective_model) but only when it
    /// is a super-resolution model.
    pub fn effective_superres_model(&self) -> Option<&str> {
        self.effective_model()
            .filter(|id| catalog::is_model_of_kind(id, KIND_SUPERRES))
    }

    /// Target scale: the explicit field first, then the scale-like keys of
    /// `parameters`. Non-positive or unparsable values are ignored.
    pub fn effective_target_scale(&self) -> Option<f64> {
        self.target_scale
            .filter(|s| *s > 0.0)
            .or_else(|| extract_target_scale(&self.parameters))
    }
}

/* --------------------------------------------------------------------------
   Helpers
   -------------------------------------------------------------------------- */

/// Validate an upscale factor.
pub fn validate_target_scale(scale: f64) -> Result<(), CoreError> {
    if !(MIN_TARGET_SCALE..=MAX_TARGET_SCALE).contains(&scale) {
        return Err(CoreError::Validation(format!(
            "target_scale must be between {MIN_TARGET_SCALE} and {MAX_TARGET_SCALE}, got {scale}"
        )));
    }
    Ok(())
}

/// Look for a positive scale under `targetScale`, `scale` or `upscale`.
///
/// Numbers and numeric strings are both accepted since the adjustment page
/// sends slider values either way.
pub fn extract_target_scale(parameters: &Map<String, Value>) -> Option<f64> {
    SCALE_PARAMETER_KEYS.iter().find_map(|key| {
        let parsed = match parameters.get(*key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.filter(|v| *v > 0.0)
    })
}

/// A mask must be an inline image data URL with a payload.
pub fn validate_mask_data_url(mask: &str) -> Result<(), CoreError> {
    let Some(rest) = mask.strip_prefix("data:") else {
        return Err(CoreError::Validation(
            "mask_data must be a data URL (data:image/png;base64,...)".to_string(),
        ));
    };
    match rest.split_once(',') {
        Some((header, payload)) if header.starts_with("image/") && !payload.is_empty() => Ok(()),
        _ => Err(CoreError::Validation(
            "mask_data is not a valid image data URL".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    // -- validate ----------------------------------------------------------------

    #[test]
    fn empty_payload_is_valid() {
        assert!(AdjustmentPayload::default().validate().is_ok());
    }

    #[test]
    fn target_scale_range_enforced() {
        let mut payload = AdjustmentPayload {
            target_scale: Some(8.0),
            ..Default::default()
        };
        assert!(payload.validate().is_ok());
        payload.target_scale = Some(8.5);
        assert_matches!(payload.validate(), Err(CoreError::Validation(_)));
        payload.target_scale = Some(0.05);
        assert_matches!(payload.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn fidelity_and_provider_checked() {
        let payload = AdjustmentPayload {
            face_restore_fidelity: Some(1.2),
            ..Default::default()
        };
        assert!(payload.validate().is_err());

        let payload = AdjustmentPayload {
            face_restore_provider: Some("restoreformer".into()),
            ..Default::default()
        };
        assert!(payload.validate().is_err());

        let payload = AdjustmentPayload {
            face_restore_provider: Some(FACE_PROVIDER_CODEFORMER.into()),
            face_restore_fidelity: Some(0.7),
            ..Default::default()
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn unknown_catalog_references_rejected() {
        let payload = AdjustmentPayload {
            model_name: Some("NotAModel".into()),
            ..Default::default()
        };
        assert!(payload.validate().is_err());

        let payload = AdjustmentPayload {
            pipeline_id: Some("nope".into()),
            ..Default::default()
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn stage_overrides_must_match_pipeline_stages() {
        let mut overrides = BTreeMap::new();
        overrides.insert("texture".to_string(), "CRFill_iccv2021".to_string());
        let mut payload = AdjustmentPayload {
            pipeline_id: Some("structure_fill".into()),
            pipeline_stage_overrides: Some(overrides.clone()),
            ..Default::default()
        };
        assert!(payload.validate().is_ok());

        // The default pipeline has no "texture" stage.
        payload.pipeline_id = None;
        assert!(payload.validate().is_err());
    }

    #[test]
    fn mask_must_be_image_data_url() {
        assert!(validate_mask_data_url("data:image/png;base64,iVBORw0").is_ok());
        assert!(validate_mask_data_url("https://example.com/mask.png").is_err());
        assert!(validate_mask_data_url("data:text/plain;base64,aGk=").is_err());
        assert!(validate_mask_data_url("data:image/png;base64,").is_err());
    }

    // -- effective values -----------------------------------------------------------

    #[test]
    fn explicit_model_wins_over_preset() {
        let payload = AdjustmentPayload {
            model_name: Some("DAT_light_2x".into()),
            preset_id: Some("night".into()),
            ..Default::default()
        };
        assert_eq!(payload.effective_model(), Some("DAT_light_2x"));
    }

    #[test]
    fn preset_supplies_model() {
        let payload = AdjustmentPayload {
            preset_id: Some("night".into()),
            ..Default::default()
        };
        assert_eq!(payload.effective_model(), Some("HAT_Real_GAN_4x"));
        assert_eq!(payload.effective_superres_model(), Some("HAT_Real_GAN_4x"));
    }

    #[test]
    fn non_superres_model_is_not_a_superres_override() {
        let payload = AdjustmentPayload {
            model_name: Some("GFPGAN_v1.4".into()),
            ..Default::default()
        };
        assert_eq!(payload.effective_superres_model(), None);
    }

    #[test]
    fn target_scale_from_parameters() {
        assert_eq!(extract_target_scale(&params(json!({"scale": 2}))), Some(2.0));
        assert_eq!(
            extract_target_scale(&params(json!({"targetScale": "3.5", "scale": 2}))),
            Some(3.5)
        );
        assert_eq!(
            extract_target_scale(&params(json!({"targetScale": -1, "upscale": 2}))),
            Some(2.0)
        );
        assert_eq!(extract_target_scale(&params(json!({"scale": "abc"}))), None);
        assert_eq!(extract_target_scale(&Map::new()), None);
    }

    #[test]
    fn explicit_target_scale_wins() {
        let payload = AdjustmentPayload {
            target_scale: Some(1.5),
            parameters: params(json!({"scale": 4})),
            ..Default::default()
        };
        assert_eq!(payload.effective_target_scale(), Some(1.5));
    }
}
