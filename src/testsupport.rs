//! Shared test fixtures: temp directories, SSE blocks, a local HTTP stub and
//! a scripted model transport.
//!
//! The stub answers canned responses per path so adapter and transport tests
//! exercise real reqwest round trips without reaching the network.

use crate::api::{Credential, ModelTransport, ProviderStream, RemoteModel, StreamChunk};
use crate::error::ApiError;
use crate::types::{ChatRequest, ProviderId, ToolCall};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory removed on drop.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "chatbridge-{prefix}-{}-{nanos}-{suffix}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Write UTF-8 text to a child path, creating parents as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// One SSE block with `event:` and `data:` lines.
pub fn sse_event_block(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

/// One SSE block with only a `data:` line.
pub fn sse_data_block(data: &str) -> String {
    format!("data: {data}\n\n")
}

// ---------------------------------------------------------------------------
// HTTP stub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl StubResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    pub fn sse(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including any query string.
    pub target: String,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

/// Local HTTP server answering canned responses by path.
///
/// Each route is used once in order; once every route for a path has been
/// consumed, the last one repeats. Unknown paths get 404.
pub struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(routes: Vec<(&'static str, StubResponse)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let routes = Arc::new(routes);
        let consumed = Arc::new(Mutex::new(HashSet::<usize>::new()));
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                let consumed = Arc::clone(&consumed);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    serve_one(stream, &routes, &consumed, &recorded).await;
                });
            }
        });
        Self {
            base_url: format!("http://{addr}"),
            requests,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_one(
    mut stream: TcpStream,
    routes: &[(&'static str, StubResponse)],
    consumed: &Mutex<HashSet<usize>>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let path = request.target.split('?').next().unwrap_or_default().to_string();
    recorded.lock().expect("requests lock").push(request);

    let response = {
        let mut used = consumed.lock().expect("consumed lock");
        let matching: Vec<usize> = routes
            .iter()
            .enumerate()
            .filter(|(_, (p, _))| *p == path)
            .map(|(i, _)| i)
            .collect();
        let pick = matching
            .iter()
            .copied()
            .find(|i| !used.contains(i))
            .or_else(|| matching.last().copied());
        pick.map(|i| {
            used.insert(i);
            routes[i].1.clone()
        })
    }
    .unwrap_or_else(|| StubResponse::text(404, "no stub route"));

    let head = format!(
        "HTTP/1.1 {} STUB\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.content_type,
        response.body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(response.body.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let target = first.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (header_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();
    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

// ---------------------------------------------------------------------------
// Scripted model transport
// ---------------------------------------------------------------------------

/// One step of a scripted provider stream.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Chunk(StreamChunk),
    Fail(String),
    Delay(std::time::Duration),
    /// Never yields again; only cancellation ends the turn.
    Hang,
}

pub fn text(delta: &str) -> ScriptStep {
    ScriptStep::Chunk(StreamChunk::TextDelta(delta.to_string()))
}

pub fn tool_call(id: &str, name: &str, input: Value) -> ScriptStep {
    ScriptStep::Chunk(StreamChunk::ToolCall(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }))
}

pub fn finished(reason: &str) -> ScriptStep {
    ScriptStep::Chunk(StreamChunk::Finished {
        reason: reason.to_string(),
    })
}

/// In-memory [`ModelTransport`]: streams are consumed in order, model lists
/// are answered per provider (`Err(status)` yields an HTTP status error).
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    models: Mutex<HashMap<ProviderId, Result<Vec<RemoteModel>, u16>>>,
    requests: Mutex<Vec<(ProviderId, ChatRequest, Credential)>>,
}

impl ScriptedTransport {
    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        self.scripts.lock().expect("scripts lock").push_back(steps);
    }

    pub fn set_models(&self, provider: ProviderId, reply: Result<Vec<&str>, u16>) {
        let reply = reply.map(|ids| {
            ids.into_iter()
                .map(|id| RemoteModel {
                    id: id.to_string(),
                    display_name: id.to_uppercase(),
                    created_at: None,
                })
                .collect()
        });
        self.models.lock().expect("models lock").insert(provider, reply);
    }

    pub fn requests(&self) -> Vec<(ProviderId, ChatRequest, Credential)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn open_stream(
        &self,
        provider: ProviderId,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<ProviderStream, ApiError> {
        self.requests.lock().expect("requests lock").push((
            provider,
            request.clone(),
            credential.clone(),
        ));
        let steps = self
            .scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .ok_or_else(|| ApiError::Status(500, "no scripted stream left".into()))?;
        let steps: VecDeque<ScriptStep> = steps.into();
        Ok(Box::pin(futures::stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.pop_front()? {
                    ScriptStep::Chunk(chunk) => return Some((Ok(chunk), steps)),
                    ScriptStep::Fail(msg) => {
                        steps.clear();
                        return Some((Err(ApiError::InvalidResponse(msg)), steps));
                    }
                    ScriptStep::Delay(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Hang => futures::future::pending::<()>().await,
                }
            }
        })))
    }

    async fn list_models(
        &self,
        provider: ProviderId,
        _credential: &Credential,
    ) -> Result<Vec<RemoteModel>, ApiError> {
        match self.models.lock().expect("models lock").get(&provider).cloned() {
            Some(Ok(models)) => Ok(models),
            Some(Err(status)) => Err(ApiError::Status(status, "scripted failure".into())),
            None => Err(ApiError::Status(404, "no scripted models".into())),
        }
    }
}
