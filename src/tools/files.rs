//! `read_file`: reads a workspace file (truncated if large).
//!
//! Paths resolve against the call's workspace; anything that escapes it,
//! including through symlinks, is refused.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use super::shell::truncate_output;
use super::{parse_input, Tool, ToolContext};
use crate::error::ToolError;
use crate::types::ToolDefinition;

pub struct ReadFileTool {
    pub max_bytes: usize,
}

#[derive(Deserialize)]
struct Args {
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().into(),
            description: "Read a UTF-8 text file. Paths are relative to the workspace.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Workspace-relative path of the file to read"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, input: &Value, context: &ToolContext) -> Result<Value, ToolError> {
        let args: Args = parse_input(input)?;
        let path = resolve_in_workspace(&context.workspace, &args.path).await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", args.path)))?;
        let content = String::from_utf8_lossy(&bytes);
        Ok(json!({
            "path": args.path,
            "truncated": content.len() > self.max_bytes,
            "content": truncate_output(&content, self.max_bytes),
        }))
    }
}

async fn resolve_in_workspace(workspace: &Path, requested: &str) -> Result<PathBuf, ToolError> {
    if requested.trim().is_empty() {
        return Err(ToolError::InvalidArguments("path is empty".into()));
    }
    let root = tokio::fs::canonicalize(workspace)
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("workspace unavailable: {e}")))?;
    let candidate = tokio::fs::canonicalize(root.join(requested))
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("{requested}: {e}")))?;
    if !candidate.starts_with(&root) {
        return Err(ToolError::InvalidArguments(format!(
            "{requested} is outside the workspace"
        )));
    }
    Ok(candidate)
}
