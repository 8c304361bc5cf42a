//! Model wrappers run as external commands.
//!
//! The ML models (Final2x, GFPGAN, PromptFix, IOPaint, ...) live in their
//! own Python environments. Each model kind is mapped to a wrapper command
//! that receives one JSON request on stdin:
//!
//! ```json
//! {
//!   "model_id": "RealESRGAN_RealESRGAN_x4plus_4x",
//!   "input_path": "/storage/processed/.work/abc/00-input.png",
//!   "output_path": "/storage/processed/.work/abc/01-superres.png",
//!   "params": {"scale": 4},
//!   "context": {"target_scale": 2.0, "prompt": null, ...},
//!   "device": "auto"
//! }
//! ```
//!
//! The wrapper writes the result image to `output_path` and exits 0. Exit
//! code 78 (`EX_CONFIG`) means the model is not installed and turns the
//! stage into a skip.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

use crate::error::StageError;
use crate::executor::{StageExecutor, StageRequest};
use crate::subprocess::run_command;

/// Exit code a wrapper uses to report a missing model or dependency.
pub const EXIT_NOT_CONFIGURED: i32 = 78;

/// Longest stderr excerpt kept in error messages.
const MAX_STDERR_CHARS: usize = 2000;

pub struct ScriptStageExecutor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    device: String,
}

impl ScriptStageExecutor {
    /// Build from a whitespace-separated command line such as
    /// `python3 wrappers/final2x.py`.
    pub fn from_command_line(command: &str, timeout: Duration, device: impl Into<String>) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
            device: device.into(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

fn tail(text: &str) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= MAX_STDERR_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - MAX_STDERR_CHARS).collect()
}

#[async_trait]
impl StageExecutor for ScriptStageExecutor {
    async fn run(&self, request: StageRequest<'_>) -> Result<(), StageError> {
        let payload = json!({
            "model_id": request.model.id,
            "input_path": request.input,
            "output_path": request.output,
            "params": request.params,
            "context": request.context,
            "device": self.device,
        });

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let output = match run_command(&mut cmd, &payload, self.timeout).await {
            Err(StageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StageError::NotConfigured(format!(
                    "Wrapper command '{}' for {} was not found",
                    self.program, request.model.name
                )));
            }
            other => other?,
        };

        tracing::debug!(
            model_id = %request.model.id,
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            "Model wrapper finished",
        );

        match output.exit_code {
            0 => {}
            EXIT_NOT_CONFIGURED => {
                let reason = tail(&output.stderr);
                return Err(StageError::NotConfigured(if reason.is_empty() {
                    format!("{} is not installed", request.model.name)
                } else {
                    reason
                }));
            }
            exit_code => {
                return Err(StageError::ExecutionFailed {
                    exit_code,
                    stderr: tail(&output.stderr),
                });
            }
        }

        if !tokio::fs::try_exists(request.output).await.unwrap_or(false) {
            return Err(StageError::MissingOutput(request.output.to_path_buf()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "script"
    }
}
