//! User-declared command tools.
//!
//! A command tool runs a shell command in the workspace with the call's JSON
//! input on stdin. JSON on stdout becomes structured data; anything else is
//! returned as text. A non-zero exit is a failed call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::process::run_shell_command;
use super::shell::truncate_output;
use super::{Tool, ToolContext};
use crate::error::ToolError;
use crate::types::ToolDefinition;

/// Declaration as stored in `tools.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub command: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

pub struct CommandTool {
    pub spec: CommandToolSpec,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.spec.name.clone(),
            description: self.spec.description.clone(),
            parameters: self.spec.parameters.clone(),
        }
    }

    async fn execute(&self, input: &Value, context: &ToolContext) -> Result<Value, ToolError> {
        let stdin = serde_json::to_vec(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let output = run_shell_command(
            &self.spec.command,
            &context.workspace,
            Some(&stdin),
            self.timeout,
            &context.signal,
        )
        .await?;
        if output.exit_code != 0 {
            let detail = if output.stderr.trim().is_empty() {
                format!("exited with {}", output.exit_code)
            } else {
                truncate_output(output.stderr.trim(), self.max_output_bytes)
            };
            return Err(ToolError::ExecutionFailed(format!(
                "{}: {detail}",
                self.spec.name
            )));
        }
        let stdout = output.stdout.trim();
        Ok(serde_json::from_str(stdout)
            .unwrap_or_else(|_| Value::String(truncate_output(stdout, self.max_output_bytes))))
    }
}
