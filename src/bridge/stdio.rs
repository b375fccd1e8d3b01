//! Newline-delimited JSON transport for the bridge.
//!
//! ```text
//! -> {"id": 1, "method": "chat.send", "params": {...}}
//! <- {"id": 1, "result": {"success": true, "data": {...}}}
//! <- {"event": "chat:event", "payload": {...}}
//! ```
//!
//! Calls run concurrently; responses are written as they complete, so a
//! peer must correlate them by `id`.

use super::{Bridge, EventSink};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How long calls still running at end of input may take to answer.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Push events become `{event, payload}` lines on the outgoing queue.
struct LineSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl EventSink for LineSink {
    fn emit(&self, event: &str, payload: Value) {
        if self
            .tx
            .send(json!({ "event": event, "payload": payload }))
            .is_err()
        {
            debug!(event, "stdio writer closed, event dropped");
        }
    }
}

/// Serve the bridge on this process's stdin/stdout until stdin closes.
pub async fn serve_stdio(bridge: Arc<Bridge>) -> std::io::Result<()> {
    serve(bridge, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve the bridge over any line-oriented byte stream pair.
pub async fn serve<R, W>(bridge: Arc<Bridge>, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_lines(writer, rx));
    bridge.attach_surface(Arc::new(LineSink { tx: tx.clone() }));
    info!("bridge serving on stdio");

    let mut calls = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();
    let read_result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let incoming: Incoming = match serde_json::from_str(trimmed) {
            Ok(incoming) => incoming,
            Err(err) => {
                warn!(error = %err, "malformed bridge request");
                let _ = tx.send(json!({
                    "id": Value::Null,
                    "result": { "success": false, "error": format!("malformed request: {err}") },
                }));
                continue;
            }
        };
        let bridge = Arc::clone(&bridge);
        let tx = tx.clone();
        calls.spawn(async move {
            let result = bridge.invoke(&incoming.method, incoming.params).await;
            let _ = tx.send(json!({ "id": incoming.id, "result": result }));
        });
        // Reap finished calls so the set does not grow without bound.
        while calls.try_join_next().is_some() {}
    };

    debug!(pending = calls.len(), "stdin closed, draining bridge calls");
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while calls.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(pending = calls.len(), "abandoning bridge calls still running at shutdown");
        calls.shutdown().await;
    }
    bridge.detach_surface();
    drop(tx);
    match writer_task.await {
        Ok(result) => result?,
        Err(err) => warn!(error = %err, "stdio writer task failed"),
    }
    read_result
}

async fn write_lines<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = message.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
