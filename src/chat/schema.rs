//! Wire shapes of the chat protocol.

use crate::tools::ToolResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Active conversation configuration. Replaced wholesale by `configure`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Model id; empty selects the default model.
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Tool allowlist; `None` allows every enabled tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
    /// Directory tools are scoped to. Defaults to the process directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendRequest {
    /// Caller-chosen correlation key, unique among active turns.
    pub request_id: String,
    pub prompt: String,
    #[serde(default)]
    pub references: Vec<Reference>,
}

/// Context attached to a prompt (file excerpt, URL, selection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ReferenceRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRange {
    pub start_line: u32,
    pub end_line: u32,
}

/// One event of a turn. `done`, `error` and `cancelled` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatEvent {
    TextDelta {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult(ToolResult),
    #[serde(rename_all = "camelCase")]
    Done {
        /// Assistant text of the whole turn.
        text: String,
        finish_reason: String,
    },
    Error {
        message: String,
    },
    Cancelled,
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. } | Self::Cancelled)
    }
}

/// Event tagged with its request, as pushed on `chat:event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEventEnvelope {
    pub request_id: String,
    /// Position within the request, starting at 0.
    pub seq: u64,
    #[serde(flatten)]
    pub event: ChatEvent,
}

/// Render a prompt and its references into the user message text.
pub(crate) fn render_prompt(request: &ChatSendRequest) -> String {
    if request.references.is_empty() {
        return request.prompt.clone();
    }
    let mut out = String::new();
    for reference in &request.references {
        let location = match reference.range {
            Some(range) => format!("{}#L{}-L{}", reference.uri, range.start_line, range.end_line),
            None => reference.uri.clone(),
        };
        match reference.content.as_deref() {
            Some(content) => {
                out.push_str(&format!("[{}] {location}\n```\n{content}", reference.kind));
                if !content.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str("```\n\n");
            }
            None => out.push_str(&format!("[{}] {location}\n\n", reference.kind)),
        }
    }
    out.push_str(&request.prompt);
    out
}
