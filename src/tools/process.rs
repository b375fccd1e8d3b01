//! Subprocess execution bounded by a timeout and an abort signal.

use crate::abort::AbortSignal;
use crate::error::ToolError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `sh -c <command>` in `cwd`, optionally piping `stdin`.
///
/// The child is killed when the abort signal fires or the timeout elapses.
pub(crate) async fn run_shell_command(
    command: &str,
    cwd: &Path,
    stdin: Option<&[u8]>,
    limit: Duration,
    signal: &AbortSignal,
) -> Result<ExecOutput, ToolError> {
    let mut cmd = Command::new("sh");
    // Dropping the wait future on abort or timeout must take the child down too.
    cmd.kill_on_drop(true);
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::ExecutionFailed(format!("sh: {e}")))?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("stdin: {e}")))?;
        // Close stdin so the child sees EOF.
        drop(pipe);
    }

    tokio::select! {
        output = child.wait_with_output() => {
            let output = output.map_err(|e| ToolError::ExecutionFailed(format!("sh: {e}")))?;
            Ok(ExecOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
        _ = signal.aborted() => Err(ToolError::Cancelled),
        _ = tokio::time::sleep(limit) => Err(ToolError::ExecutionFailed(format!(
            "command timed out after {}s",
            limit.as_secs_f64()
        ))),
    }
}
