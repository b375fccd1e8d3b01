//! One chat turn: provider round trips interleaved with tool calls.

use super::controller::ChatDeps;
use super::emitter::{RequestEvents, Terminal};
use crate::abort::AbortSignal;
use crate::api::StreamChunk;
use crate::error::ChatError;
use crate::tools::{MergedCatalog, ToolContext};
use crate::types::{ChatRequest, Message, ProviderId, ToolCall};
use futures::StreamExt;
use std::path::PathBuf;
use tracing::{debug, warn};

const DEFAULT_FINISH_REASON: &str = "stop";

/// Everything a turn needs, resolved before it is spawned.
pub(crate) struct Turn {
    pub request_id: String,
    pub provider: ProviderId,
    /// Request for the first round; `messages` ends with the user message.
    pub request: ChatRequest,
    pub allow: Option<Vec<String>>,
    pub workspace: PathBuf,
    pub catalog: MergedCatalog,
}

pub(crate) struct TurnOutcome {
    pub terminal: Terminal,
    /// Assistant and tool messages produced by the turn, in order.
    pub transcript: Vec<Message>,
}

impl TurnOutcome {
    fn new(terminal: Terminal, transcript: Vec<Message>) -> Self {
        Self {
            terminal,
            transcript,
        }
    }
}

struct RoundOutput {
    text: String,
    calls: Vec<ToolCall>,
    finish_reason: Option<String>,
}

impl Turn {
    /// Drive the turn to a terminal state. Progress events go to `events`;
    /// the terminal event is left to the caller.
    pub async fn run(
        mut self,
        deps: &ChatDeps,
        events: &mut RequestEvents,
        signal: &AbortSignal,
    ) -> TurnOutcome {
        let mut transcript = Vec::new();

        let credential = tokio::select! {
            biased;
            _ = signal.aborted() => return TurnOutcome::new(Terminal::Cancelled, transcript),
            credential = deps.registry.credential(self.provider) => match credential {
                Ok(credential) => credential,
                Err(err) => {
                    let err = ChatError::Credentials(err.to_string());
                    warn!(request_id = %self.request_id, provider = %self.provider, error = %err, "turn aborted before streaming");
                    return TurnOutcome::new(Terminal::Error(err.to_string()), transcript);
                }
            },
        };

        let mut text = String::new();
        let max_rounds = deps.config.max_tool_rounds.max(1);
        for round in 1..=max_rounds {
            debug!(request_id = %self.request_id, round, model = %self.request.model, "opening provider stream");
            let output = match self.stream_round(deps, &credential, events, signal).await {
                Ok(output) => output,
                Err(terminal) => return TurnOutcome::new(terminal, transcript),
            };
            text.push_str(&output.text);

            let assistant = Message::assistant(Some(output.text), output.calls.clone());
            self.request.messages.push(assistant.clone());
            transcript.push(assistant);

            if output.calls.is_empty() {
                let finish_reason = output
                    .finish_reason
                    .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string());
                return TurnOutcome::new(
                    Terminal::Done {
                        text,
                        finish_reason,
                    },
                    transcript,
                );
            }

            for call in &output.calls {
                if signal.is_aborted() {
                    return TurnOutcome::new(Terminal::Cancelled, transcript);
                }
                let context = ToolContext {
                    call_id: call.id.clone(),
                    request_id: self.request_id.clone(),
                    workspace: self.workspace.clone(),
                    signal: signal.clone(),
                };
                let result = deps
                    .dispatcher
                    .execute(&self.catalog, call, self.allow.as_deref(), &context)
                    .await;
                let message = Message::tool_result(&result.id, result.model_content());
                events.tool_result(result).await;
                self.request.messages.push(message.clone());
                transcript.push(message);
            }
            if signal.is_aborted() {
                return TurnOutcome::new(Terminal::Cancelled, transcript);
            }
        }

        warn!(request_id = %self.request_id, max_rounds, "tool round limit reached");
        TurnOutcome::new(
            Terminal::Error(format!("stopped after {max_rounds} tool rounds")),
            transcript,
        )
    }

    /// Stream one provider response. `Err` carries the terminal state.
    async fn stream_round(
        &self,
        deps: &ChatDeps,
        credential: &crate::api::Credential,
        events: &mut RequestEvents,
        signal: &AbortSignal,
    ) -> Result<RoundOutput, Terminal> {
        let mut stream = tokio::select! {
            biased;
            _ = signal.aborted() => return Err(Terminal::Cancelled),
            opened = deps.transport.open_stream(self.provider, &self.request, credential) => {
                opened.map_err(|err| Terminal::Error(err.to_string()))?
            }
        };

        let mut output = RoundOutput {
            text: String::new(),
            calls: Vec::new(),
            finish_reason: None,
        };
        loop {
            let next = tokio::select! {
                biased;
                _ = signal.aborted() => return Err(Terminal::Cancelled),
                next = stream.next() => next,
            };
            match next {
                None => break,
                Some(Err(err)) => {
                    debug!(request_id = %self.request_id, error = %err, "provider stream failed");
                    return Err(Terminal::Error(err.to_string()));
                }
                Some(Ok(StreamChunk::TextDelta(delta))) => {
                    events.text_delta(&delta).await;
                    output.text.push_str(&delta);
                }
                Some(Ok(StreamChunk::ToolCall(call))) => {
                    events.tool_call(&call).await;
                    output.calls.push(call);
                }
                Some(Ok(StreamChunk::Finished { reason })) => {
                    output.finish_reason = Some(reason);
                    break;
                }
            }
        }
        Ok(output)
    }
}
