use std::collections::BTreeMap;
use std::time::Duration;

use relaize_core::adjustments::{
    FACE_PROVIDER_GFPGAN, MAX_FACE_FIDELITY, MIN_FACE_FIDELITY, VALID_FACE_PROVIDERS,
};
use relaize_core::catalog::MODEL_KINDS;

/// Model execution settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Whether super-resolution stages may run at all.
    pub final2x_enabled: bool,
    /// Use the built-in Lanczos resampler when no super-resolution command
    /// is configured.
    pub resample_fallback: bool,
    /// Model kind → command line of the wrapper script for that kind.
    pub scripts: BTreeMap<String, String>,
    /// Wall-clock limit of a single model process.
    pub model_timeout: Duration,
    /// Device hint forwarded to wrapper scripts (`auto`, `cuda`, `cpu`).
    pub device: String,
    /// Append a face restoration stage when the task does not say.
    pub face_restore_enabled: bool,
    pub face_restore_provider: String,
    pub face_restore_fidelity: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            final2x_enabled: true,
            resample_fallback: true,
            scripts: BTreeMap::new(),
            model_timeout: Duration::from_secs(600),
            device: "auto".into(),
            face_restore_enabled: false,
            face_restore_provider: FACE_PROVIDER_GFPGAN.into(),
            face_restore_fidelity: 0.5,
        }
    }
}

/// Environment variable holding the command for a model kind,
/// e.g. `MODEL_SCRIPT_MASK_INPAINT` for `mask-inpaint`.
pub fn script_env_var(kind: &str) -> String {
    format!("MODEL_SCRIPT_{}", kind.to_ascii_uppercase().replace('-', "_"))
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default  |
    /// |------------------------------|----------|
    /// | `FINAL2X_ENABLED`            | `true`   |
    /// | `SUPERRES_RESAMPLE_FALLBACK` | `true`   |
    /// | `MODEL_SCRIPT_<KIND>`        | unset    |
    /// | `MODEL_TIMEOUT_SECS`         | `600`    |
    /// | `MODEL_DEVICE`               | `auto`   |
    /// | `FACE_RESTORE_ENABLED`       | `false`  |
    /// | `FACE_RESTORE_PROVIDER`      | `gfpgan` |
    /// | `FACE_RESTORE_FIDELITY`      | `0.5`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scripts = MODEL_KINDS
            .iter()
            .filter_map(|kind| {
                let command = std::env::var(script_env_var(kind)).ok()?;
                let command = command.trim();
                (!command.is_empty()).then(|| (kind.to_string(), command.to_string()))
            })
            .collect();

        let model_timeout_secs: u64 = std::env::var("MODEL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("MODEL_TIMEOUT_SECS must be a valid u64");

        let face_restore_provider = std::env::var("FACE_RESTORE_PROVIDER")
            .map(|p| p.trim().to_ascii_lowercase())
            .unwrap_or(defaults.face_restore_provider);
        assert!(
            VALID_FACE_PROVIDERS.contains(&face_restore_provider.as_str()),
            "FACE_RESTORE_PROVIDER must be one of: {}",
            VALID_FACE_PROVIDERS.join(", ")
        );

        let face_restore_fidelity: f64 = std::env::var("FACE_RESTORE_FIDELITY")
            .unwrap_or_else(|_| "0.5".into())
            .parse()
            .expect("FACE_RESTORE_FIDELITY must be a number");

        Self {
            final2x_enabled: env_flag("FINAL2X_ENABLED", defaults.final2x_enabled),
            resample_fallback: env_flag("SUPERRES_RESAMPLE_FALLBACK", defaults.resample_fallback),
            scripts,
            model_timeout: Duration::from_secs(model_timeout_secs.max(1)),
            device: std::env::var("MODEL_DEVICE").unwrap_or(defaults.device),
            face_restore_enabled: env_flag("FACE_RESTORE_ENABLED", defaults.face_restore_enabled),
            face_restore_provider,
            face_restore_fidelity: face_restore_fidelity.clamp(MIN_FACE_FIDELITY, MAX_FACE_FIDELITY),
        }
    }
}
