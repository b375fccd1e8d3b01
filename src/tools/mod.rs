//! Pluggable tool system.
//!
//! Tools are async trait objects the model can invoke during a chat turn.
//! The catalog merges builtin, global and workspace tools; the dispatcher
//! runs one call under the owning request's abort signal.

pub mod catalog;
pub mod command;
pub mod dispatcher;
pub mod files;
mod process;
pub mod shell;
pub mod time;

use crate::abort::AbortSignal;
use crate::error::ToolError;
use crate::types::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub use catalog::{MergedCatalog, ToolCatalog, ToolOrigin, ToolSettings, ToolSummary};
pub use dispatcher::ToolDispatcher;

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// A tool that can be invoked by the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name matching what the model will call.
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Long-running handlers must watch `context.signal`.
    async fn execute(&self, input: &Value, context: &ToolContext) -> Result<Value, ToolError>;
}

/// Per-call execution context.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub call_id: String,
    pub request_id: String,
    /// Directory the call is scoped to.
    pub workspace: PathBuf,
    pub signal: AbortSignal,
}

/// Outcome of one tool call, correlated to the model's call id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(id: &str, name: &str, data: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(id: &str, name: &str, error: &ToolError) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }

    /// Text sent back to the model as the tool message content.
    pub fn model_content(&self) -> String {
        match (&self.data, &self.error) {
            (_, Some(error)) => serde_json::json!({ "error": error }).to_string(),
            (Some(Value::String(text)), None) => text.clone(),
            (Some(data), None) => data.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Deserialize a tool's JSON input into its argument struct.
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, ToolError> {
    // Some providers hand back unparseable argument text as a JSON string.
    if let Value::String(raw) = input {
        return serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()));
    }
    serde_json::from_value(input.clone()).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
