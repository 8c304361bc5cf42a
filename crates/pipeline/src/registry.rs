use std::collections::HashMap;
use std::sync::Arc;

use relaize_core::catalog::KIND_SUPERRES;

use crate::config::{script_env_var, PipelineConfig};
use crate::error::StageError;
use crate::executor::StageExecutor;
use crate::resample::ResampleExecutor;
use crate::script::ScriptStageExecutor;

/// Model kind → executor.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StageExecutor>>,
    /// Why a kind has no executor, when it was switched off explicitly.
    disabled: HashMap<String, String>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executors for every kind that has a wrapper command, plus the
    /// resample fallback for super-resolution.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut registry = Self::new();

        for (kind, command) in &config.scripts {
            if let Some(exec) =
                ScriptStageExecutor::from_command_line(command, config.model_timeout, &config.device)
            {
                tracing::info!(kind = %kind, program = exec.program(), "Model wrapper registered");
                registry.register(kind, Arc::new(exec));
            }
        }

        if !registry.executors.contains_key(KIND_SUPERRES) && config.resample_fallback {
            tracing::info!("No super-resolution wrapper configured; using Lanczos resampling");
            registry.register(KIND_SUPERRES, Arc::new(ResampleExecutor));
        }

        if !config.final2x_enabled {
            registry.disable(KIND_SUPERRES, "Final2x is disabled; super-resolution stages are skipped");
        }

        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, executor: Arc<dyn StageExecutor>) {
        let kind = kind.into();
        self.disabled.remove(&kind);
        self.executors.insert(kind, executor);
    }

    /// Remove any executor for `kind`; its stages report `reason` when
    /// skipped.
    pub fn disable(&mut self, kind: impl Into<String>, reason: impl Into<String>) {
        let kind = kind.into();
        self.executors.remove(&kind);
        self.disabled.insert(kind, reason.into());
    }

    /// Executor for a model kind, or `NotConfigured`.
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn StageExecutor>, StageError> {
        if let Some(exec) = self.executors.get(kind) {
            return Ok(Arc::clone(exec));
        }
        Err(StageError::NotConfigured(match self.disabled.get(kind) {
            Some(reason) => reason.clone(),
            None => format!(
                "No executor for '{kind}' models; set {} to a wrapper command",
                script_env_var(kind)
            ),
        }))
    }

    /// Kinds that currently have an executor.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
