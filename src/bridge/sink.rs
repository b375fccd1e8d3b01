//! Push-event surfaces.

use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::trace;

pub const CHAT_EVENT: &str = "chat:event";
pub const MODELS_CHANGED: &str = "models:changed";

/// Receiver of unsolicited events (a window, a stdio peer, a test recorder).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

/// The currently attached surface, if any. Events emitted while nothing is
/// attached are dropped.
#[derive(Default)]
pub(crate) struct SurfaceSlot {
    current: RwLock<Option<Arc<dyn EventSink>>>,
}

impl SurfaceSlot {
    pub fn replace(&self, sink: Option<Arc<dyn EventSink>>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = sink;
    }

    pub fn emit(&self, event: &str, payload: Value) {
        let sink = self
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match sink {
            Some(sink) => sink.emit(event, payload),
            None => trace!(event, "no surface attached, event dropped"),
        }
    }
}
