//! OpenAI Chat Completions wire format.

use super::sse::{SseDecoder, SseEvent};
use super::{RemoteModel, StreamChunk};
use crate::error::ApiError;
use crate::types::{ChatRequest, Message, Role, ToolCall};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub(crate) fn request_body(request: &ChatRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system.as_deref().filter(|s| !s.trim().is_empty()) {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.extend(request.messages.iter().map(wire_message));

    let mut body = json!({
        "model": request.model,
        "stream": true,
        "messages": messages,
    });
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
    }
    if let Some(t) = request.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(max) = request.max_tokens {
        body["max_tokens"] = json!(max);
    }
    body
}

fn wire_message(message: &Message) -> Value {
    match message.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content.clone().unwrap_or_default(),
        }),
        Role::Assistant if !message.tool_calls.is_empty() => json!({
            "role": "assistant",
            "content": message.content,
            "tool_calls": message.tool_calls.iter().map(|call| json!({
                "id": call.id,
                "type": "function",
                "function": {"name": call.name, "arguments": call.input.to_string()},
            })).collect::<Vec<_>>(),
        }),
        role => json!({
            "role": role,
            "content": message.content.clone().unwrap_or_default(),
        }),
    }
}

/// `GET /models` payload.
pub(crate) fn parse_models(body: &Value) -> Result<Vec<RemoteModel>, ApiError> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::InvalidResponse("models response missing `data`".into()))?;
    let mut models: Vec<RemoteModel> = data
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_str()?.to_string();
            Some(RemoteModel {
                display_name: id.clone(),
                created_at: entry
                    .get("created")
                    .and_then(Value::as_i64)
                    .map(|secs| secs.saturating_mul(1000)),
                id,
            })
        })
        .collect();
    models.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(models)
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Streaming decoder for `chat.completion.chunk` events.
#[derive(Debug, Default)]
pub(crate) struct ChatCompletionsDecoder {
    calls: BTreeMap<u64, PartialCall>,
    finished: bool,
}

impl ChatCompletionsDecoder {
    fn finish(&mut self, reason: String) -> Vec<StreamChunk> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut chunks: Vec<StreamChunk> = std::mem::take(&mut self.calls)
            .into_values()
            .map(|call| {
                StreamChunk::ToolCall(ToolCall {
                    input: parse_arguments(&call.arguments),
                    id: call.id,
                    name: call.name,
                })
            })
            .collect();
        chunks.push(StreamChunk::Finished { reason });
        chunks
    }
}

/// Parse accumulated argument text; malformed JSON is passed through as a string.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl SseDecoder for ChatCompletionsDecoder {
    fn on_event(&mut self, event: &SseEvent) -> Result<Vec<StreamChunk>, ApiError> {
        let data = event.data.trim();
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data == "[DONE]" {
            return Ok(self.finish("stop".to_string()));
        }
        if self.finished {
            return Ok(Vec::new());
        }
        let payload: Value = serde_json::from_str(data).map_err(|err| {
            ApiError::InvalidResponse(format!("invalid streaming event payload: {err}"))
        })?;
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("provider reported an error");
            return Err(ApiError::InvalidResponse(message.to_string()));
        }

        let mut chunks = Vec::new();
        let Some(choice) = payload.get("choices").and_then(|c| c.get(0)) else {
            return Ok(chunks);
        };
        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    chunks.push(StreamChunk::TextDelta(text.to_string()));
                }
            }
            for call in delta
                .get("tool_calls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                let entry = self.calls.entry(index).or_default();
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    entry.id = id.to_string();
                }
                if let Some(function) = call.get("function") {
                    if let Some(name) = function.get("name").and_then(Value::as_str) {
                        entry.name.push_str(name);
                    }
                    if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                        entry.arguments.push_str(args);
                    }
                }
            }
        }
        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            chunks.extend(self.finish(reason.to_string()));
        }
        Ok(chunks)
    }

    fn on_eof(&mut self) -> Result<Vec<StreamChunk>, ApiError> {
        if self.finished {
            Ok(Vec::new())
        } else {
            Err(ApiError::InvalidResponse(
                "stream ended before completion".to_string(),
            ))
        }
    }
}
