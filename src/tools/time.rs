//! Clock tool.
//!
//! Exposes the host's current wall-clock time so the model can reason about
//! dates and deadlines.

use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde_json::{json, Value};

use super::{Tool, ToolContext};
use crate::error::ToolError;
use crate::types::ToolDefinition;

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().into(),
            description: "Return the current date and time of the host, in UTC and local time."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, input: &Value, _context: &ToolContext) -> Result<Value, ToolError> {
        if !(input.is_object() || input.is_null()) {
            return Err(ToolError::InvalidArguments(
                "arguments must be a JSON object".into(),
            ));
        }
        Ok(snapshot(Utc::now()))
    }
}

fn snapshot(now: DateTime<Utc>) -> Value {
    let local = now.with_timezone(&Local);
    json!({
        "utc": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        "local": local.to_rfc3339_opts(SecondsFormat::Secs, false),
        "unixMillis": now.timestamp_millis(),
        "weekday": now.format("%A").to_string(),
    })
}
