//! Per-request event channel.
//!
//! Progress events go through `&mut self` methods; the terminal event is
//! only reachable through [`RequestEvents::finish`], which consumes the
//! emitter, so a request can never produce two terminal events.

use super::schema::{ChatEvent, ChatEventEnvelope};
use crate::tools::ToolResult;
use crate::types::ToolCall;
use tokio::sync::mpsc;
use tracing::debug;

pub type ChatEventStream = mpsc::Receiver<ChatEventEnvelope>;

/// Terminal state of a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    Done { text: String, finish_reason: String },
    Error(String),
    Cancelled,
}

impl From<Terminal> for ChatEvent {
    fn from(value: Terminal) -> Self {
        match value {
            Terminal::Done {
                text,
                finish_reason,
            } => ChatEvent::Done {
                text,
                finish_reason,
            },
            Terminal::Error(message) => ChatEvent::Error { message },
            Terminal::Cancelled => ChatEvent::Cancelled,
        }
    }
}

pub struct RequestEvents {
    request_id: String,
    seq: u64,
    tx: mpsc::Sender<ChatEventEnvelope>,
}

impl RequestEvents {
    pub fn channel(request_id: &str, capacity: usize) -> (Self, ChatEventStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                request_id: request_id.to_string(),
                seq: 0,
                tx,
            },
            rx,
        )
    }

    pub async fn text_delta(&mut self, text: &str) {
        self.push(ChatEvent::TextDelta {
            text: text.to_string(),
        })
        .await;
    }

    pub async fn tool_call(&mut self, call: &ToolCall) {
        self.push(ChatEvent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        })
        .await;
    }

    pub async fn tool_result(&mut self, result: ToolResult) {
        self.push(ChatEvent::ToolResult(result)).await;
    }

    /// Emit the terminal event. The stream stays open until the returned
    /// handle is dropped.
    #[must_use = "dropping the handle closes the stream"]
    pub async fn finish(mut self, terminal: Terminal) -> FinishedEvents {
        self.push(terminal.into()).await;
        FinishedEvents { _tx: self.tx }
    }

    async fn push(&mut self, event: ChatEvent) {
        let envelope = ChatEventEnvelope {
            request_id: self.request_id.clone(),
            seq: self.seq,
            event,
        };
        self.seq += 1;
        if self.tx.send(envelope).await.is_err() {
            debug!(request_id = %self.request_id, "event listener dropped");
        }
    }
}

/// A request whose terminal event has been sent; dropping it closes the
/// listener's stream.
pub struct FinishedEvents {
    _tx: mpsc::Sender<ChatEventEnvelope>,
}
