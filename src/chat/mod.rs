//! Streaming chat core.
//!
//! A [`ChatController`] owns the session configuration, the conversation
//! history and the table of in-flight requests. Each `send` spawns one turn
//! task that streams provider output, runs tool calls through the
//! dispatcher and emits sequenced [`ChatEvent`]s on the request's own
//! channel until exactly one terminal event.

pub mod agents;
pub mod controller;
pub mod emitter;
pub mod history;
pub mod schema;
mod turn;

pub use controller::{ChatController, ChatDeps};
pub use emitter::{ChatEventStream, Terminal};
pub use schema::{
    ChatEvent, ChatEventEnvelope, ChatOptions, ChatSendRequest, Reference, ReferenceRange,
    SessionConfig,
};
