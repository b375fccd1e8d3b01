//! Incremental server-sent-events framing over a reqwest body stream.

use super::{ProviderStream, StreamChunk};
use crate::error::ApiError;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::VecDeque;

/// One complete SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Splits arbitrary byte chunks into SSE events.
///
/// Multiple `data:` lines are joined with `\n`; comment lines and fields other
/// than `event`/`data` are ignored.
#[derive(Debug, Default)]
pub(crate) struct SseFramer {
    buffer: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseFramer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).to_string();
            self.handle_line(line.strip_suffix('\r').unwrap_or(&line), &mut events);
        }
        events
    }

    /// Flush a trailing event not terminated by a blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).to_string();
            self.handle_line(line.strip_suffix('\r').unwrap_or(&line), &mut events);
        }
        self.handle_line("", &mut events);
        events
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if !self.data_lines.is_empty() {
                events.push(SseEvent {
                    event: self.event.take(),
                    data: self.data_lines.join("\n"),
                });
                self.data_lines.clear();
            }
            self.event = None;
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Provider-specific interpretation of SSE events.
pub(crate) trait SseDecoder: Send + 'static {
    fn on_event(&mut self, event: &SseEvent) -> Result<Vec<StreamChunk>, ApiError>;
    /// Called once when the body ends.
    fn on_eof(&mut self) -> Result<Vec<StreamChunk>, ApiError>;
}

struct DecodeState<D> {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    framer: SseFramer,
    decoder: D,
    pending: VecDeque<Result<StreamChunk, ApiError>>,
    finished: bool,
}

impl<D: SseDecoder> DecodeState<D> {
    fn queue(&mut self, result: Result<Vec<StreamChunk>, ApiError>) {
        if self.finished {
            return;
        }
        match result {
            Ok(chunks) => self.pending.extend(chunks.into_iter().map(Ok)),
            Err(err) => {
                self.pending.push_back(Err(err));
                self.finished = true;
            }
        }
    }
}

/// Turn a streaming HTTP response into normalized chunks.
///
/// The stream ends after the first error.
pub(crate) fn decode_sse<D: SseDecoder>(response: reqwest::Response, decoder: D) -> ProviderStream {
    let state = DecodeState {
        body: response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed(),
        framer: SseFramer::default(),
        decoder,
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for event in st.framer.push(&bytes) {
                        let result = st.decoder.on_event(&event);
                        st.queue(result);
                    }
                }
                Some(Err(err)) => {
                    st.pending.push_back(Err(ApiError::Http(err)));
                    st.finished = true;
                }
                None => {
                    for event in st.framer.finish() {
                        let result = st.decoder.on_event(&event);
                        st.queue(result);
                    }
                    let result = st.decoder.on_eof();
                    st.queue(result);
                    st.finished = true;
                }
            }
        }
    }))
}
