//! Runs one tool call under its request's abort signal.

use super::{MergedCatalog, ToolContext, ToolResult};
use crate::error::ToolError;
use crate::types::ToolCall;
use std::time::Duration;
use tracing::{debug, warn};

/// Isolation and correlation for tool calls.
///
/// Every outcome, including lookup failures and cancellation, comes back as
/// a [`ToolResult`] carrying the model's call id.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    /// How long a handler may keep running after its abort signal fires.
    grace: Duration,
}

impl ToolDispatcher {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub async fn execute(
        &self,
        catalog: &MergedCatalog,
        call: &ToolCall,
        allow: Option<&[String]>,
        context: &ToolContext,
    ) -> ToolResult {
        match self.run(catalog, call, allow, context).await {
            Ok(data) => ToolResult::ok(&call.id, &call.name, data),
            Err(err) => {
                debug!(tool = %call.name, call_id = %call.id, error = %err, "tool call failed");
                ToolResult::failed(&call.id, &call.name, &err)
            }
        }
    }

    async fn run(
        &self,
        catalog: &MergedCatalog,
        call: &ToolCall,
        allow: Option<&[String]>,
        context: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = catalog.lookup(&call.name, allow)?;
        if context.signal.is_aborted() {
            return Err(ToolError::Cancelled);
        }
        let run = tool.execute(&call.input, context);
        tokio::pin!(run);
        tokio::select! {
            biased;
            result = &mut run => result,
            _ = context.signal.aborted() => {
                match tokio::time::timeout(self.grace, &mut run).await {
                    Ok(_) => Err(ToolError::Cancelled),
                    Err(_) => {
                        warn!(
                            tool = %call.name,
                            call_id = %call.id,
                            grace_ms = self.grace.as_millis() as u64,
                            "tool ignored cancellation, abandoning it"
                        );
                        Err(ToolError::TimedOut)
                    }
                }
            }
        }
    }
}
