//! Anthropic Messages wire format.

use super::openai::parse_arguments;
use super::sse::{SseDecoder, SseEvent};
use super::{RemoteModel, StreamChunk};
use crate::error::ApiError;
use crate::types::{ChatRequest, Message, Role, ToolCall};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub(crate) const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub(crate) fn request_body(request: &ChatRequest) -> Value {
    let mut system_parts: Vec<&str> = request
        .system
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .into_iter()
        .collect();
    let mut messages: Vec<Value> = Vec::new();
    for message in &request.messages {
        match message.role {
            Role::System => {
                if let Some(text) = message.content.as_deref() {
                    system_parts.push(text);
                }
            }
            Role::User => messages.push(json!({
                "role": "user",
                "content": message.content.clone().unwrap_or_default(),
            })),
            Role::Assistant => messages.push(assistant_message(message)),
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id,
                    "content": message.content.clone().unwrap_or_default(),
                });
                // Consecutive results share one user turn.
                match messages.last_mut() {
                    Some(last) if is_tool_result_turn(last) => {
                        if let Some(blocks) = last["content"].as_array_mut() {
                            blocks.push(block);
                        }
                    }
                    _ => messages.push(json!({"role": "user", "content": [block]})),
                }
            }
        }
    }

    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "stream": true,
        "messages": messages,
    });
    if !system_parts.is_empty() {
        body["system"] = json!(system_parts.join("\n\n"));
    }
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters,
                })
            })
            .collect();
    }
    if let Some(t) = request.temperature {
        body["temperature"] = json!(t);
    }
    body
}

fn assistant_message(message: &Message) -> Value {
    let mut blocks = Vec::new();
    if let Some(text) = message.content.as_deref().filter(|t| !t.is_empty()) {
        blocks.push(json!({"type": "text", "text": text}));
    }
    for call in &message.tool_calls {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.input,
        }));
    }
    json!({"role": "assistant", "content": blocks})
}

fn is_tool_result_turn(message: &Value) -> bool {
    message["role"] == "user"
        && message["content"]
            .as_array()
            .and_then(|blocks| blocks.first())
            .is_some_and(|block| block["type"] == "tool_result")
}

/// `GET /v1/models` payload.
pub(crate) fn parse_models(body: &Value) -> Result<Vec<RemoteModel>, ApiError> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::InvalidResponse("models response missing `data`".into()))?;
    Ok(data
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_str()?.to_string();
            let display_name = entry
                .get("display_name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| id.clone());
            let created_at = entry
                .get("created_at")
                .and_then(Value::as_str)
                .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                .map(|dt| dt.timestamp_millis());
            Some(RemoteModel {
                id,
                display_name,
                created_at,
            })
        })
        .collect())
}

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    json: String,
}

/// Streaming decoder for Messages API events.
#[derive(Debug, Default)]
pub(crate) struct MessagesDecoder {
    tools: BTreeMap<u64, PendingToolUse>,
    stop_reason: Option<String>,
    finished: bool,
}

impl SseDecoder for MessagesDecoder {
    fn on_event(&mut self, event: &SseEvent) -> Result<Vec<StreamChunk>, ApiError> {
        if self.finished || event.data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let payload: Value = serde_json::from_str(&event.data).map_err(|err| {
            ApiError::InvalidResponse(format!("invalid streaming event payload: {err}"))
        })?;
        let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0);
        let mut chunks = Vec::new();
        match payload.get("type").and_then(Value::as_str).unwrap_or_default() {
            "content_block_start" => {
                let block = &payload["content_block"];
                match block["type"].as_str() {
                    Some("tool_use") => {
                        self.tools.insert(
                            index,
                            PendingToolUse {
                                id: block["id"].as_str().unwrap_or_default().to_string(),
                                name: block["name"].as_str().unwrap_or_default().to_string(),
                                json: String::new(),
                            },
                        );
                    }
                    Some("text") => {
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            chunks.push(StreamChunk::TextDelta(text.to_string()));
                        }
                    }
                    _ => {}
                }
            }
            "content_block_delta" => {
                let delta = &payload["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                            chunks.push(StreamChunk::TextDelta(text.to_string()));
                        }
                    }
                    Some("input_json_delta") => {
                        if let (Some(tool), Some(part)) =
                            (self.tools.get_mut(&index), delta["partial_json"].as_str())
                        {
                            tool.json.push_str(part);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(tool) = self.tools.remove(&index) {
                    chunks.push(StreamChunk::ToolCall(ToolCall {
                        id: tool.id,
                        name: tool.name,
                        input: parse_arguments(&tool.json),
                    }));
                }
            }
            "message_delta" => {
                if let Some(reason) = payload["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
            }
            "message_stop" => {
                self.finished = true;
                chunks.push(StreamChunk::Finished {
                    reason: self
                        .stop_reason
                        .take()
                        .unwrap_or_else(|| "end_turn".to_string()),
                });
            }
            "error" => {
                let message = payload["error"]["message"]
                    .as_str()
                    .unwrap_or("provider reported an error");
                return Err(ApiError::InvalidResponse(message.to_string()));
            }
            _ => {}
        }
        Ok(chunks)
    }

    fn on_eof(&mut self) -> Result<Vec<StreamChunk>, ApiError> {
        if self.finished {
            Ok(Vec::new())
        } else {
            Err(ApiError::InvalidResponse(
                "stream ended before message_stop".to_string(),
            ))
        }
    }
}
