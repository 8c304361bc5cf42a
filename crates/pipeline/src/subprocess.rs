//! Child process handling for model wrapper scripts.
//!
//! [`run_command`] pipes a JSON request to the child's stdin, captures
//! stdout/stderr and enforces the timeout. The caller sets program and
//! arguments and interprets the exit code.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::StageError;

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `-1` if killed by a signal.
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Stdout parsed as JSON, if it is JSON.
    pub parsed_output: Option<Value>,
}

/// Spawn `cmd`, write `request` to stdin and wait up to `timeout`.
///
/// The child is killed when the timeout fires.
pub async fn run_command(
    cmd: &mut Command,
    request: &Value,
    timeout: Duration,
) -> Result<CommandOutput, StageError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        let payload = serde_json::to_vec(request)
            .map_err(|e| StageError::InvalidParams(e.to_string()))?;
        // The child may exit without reading stdin.
        let _ = stdin.write_all(&payload).await;
        drop(stdin);
    }

    // Drain both pipes concurrently so a chatty child cannot block on a
    // full pipe while we wait on it.
    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
            let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
            let parsed_output = serde_json::from_str(stdout.trim()).ok();

            Ok(CommandOutput {
                stdout,
                stderr,
                exit_code: status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
                parsed_output,
            })
        }
        Ok(Err(e)) => Err(StageError::Io(e)),
        Err(_elapsed) => Err(StageError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}
