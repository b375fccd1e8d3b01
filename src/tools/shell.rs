//! Shell command execution tool.
//!
//! Runs a command via `sh -c` in the call's workspace and returns
//! stdout/stderr/exit code. The child is killed when the request is cancelled.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::process::run_shell_command;
use super::{parse_input, Tool, ToolContext};
use crate::error::ToolError;
use crate::textutil::truncate_with_suffix_by_bytes;
use crate::types::ToolDefinition;

const TRUNCATED_SUFFIX: &str = "...[truncated]";

pub struct ShellTool {
    pub timeout: Duration,
    /// Per-stream output cap in bytes.
    pub max_output_bytes: usize,
}

#[derive(Deserialize)]
struct Args {
    command: String,
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "run_shell"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().into(),
            description: "Run a shell command in the workspace and return stdout, stderr and the exit code.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, input: &Value, context: &ToolContext) -> Result<Value, ToolError> {
        let args: Args = parse_input(input)?;
        if args.command.trim().is_empty() {
            return Err(ToolError::InvalidArguments("command is empty".into()));
        }
        let output = run_shell_command(
            &args.command,
            &context.workspace,
            None,
            self.timeout,
            &context.signal,
        )
        .await?;
        Ok(json!({
            "exitCode": output.exit_code,
            "stdout": truncate_output(&output.stdout, self.max_output_bytes),
            "stderr": truncate_output(&output.stderr, self.max_output_bytes),
        }))
    }
}

pub(crate) fn truncate_output(text: &str, max_bytes: usize) -> String {
    truncate_with_suffix_by_bytes(text, max_bytes, TRUNCATED_SUFFIX)
}
