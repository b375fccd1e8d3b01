//! End-to-end bridge scenarios against in-memory providers.
//!
//! Everything here goes through the public API: a mock model transport, a
//! scripted identity adapter and a recording event surface.

use async_trait::async_trait;
use chatbridge::api::{Credential, ModelTransport, ProviderStream, RemoteModel, StreamChunk};
use chatbridge::auth::{
    AdapterSet, AuthError, AuthorizeOutcome, CredentialStore, OAuthAdapter, OAuthManager,
    OAuthProfile, OAuthTokens,
};
use chatbridge::bridge::{Bridge, EventSink, CHAT_EVENT};
use chatbridge::chat::{ChatController, ChatDeps};
use chatbridge::config::{ChatConfig, ToolsConfig};
use chatbridge::error::{ApiError, ToolError};
use chatbridge::models::ModelRegistry;
use chatbridge::store::JsonDocument;
use chatbridge::tools::{Tool, ToolCatalog, ToolContext, ToolDispatcher};
use chatbridge::types::{ChatRequest, ProviderId, ToolCall, ToolDefinition};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct TempDir(PathBuf);

impl TempDir {
    fn new(prefix: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "chatbridge-it-{prefix}-{}-{nanos}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&path).expect("create temp dir");
        Self(path)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

enum Step {
    Chunk(StreamChunk),
    Hang,
}

/// Model transport that replays queued streams and answers model lists
/// with a fixed status or id list.
#[derive(Default)]
struct MockTransport {
    streams: Mutex<VecDeque<Vec<Step>>>,
    list_status: Mutex<Option<u16>>,
    opened: Mutex<Vec<ChatRequest>>,
}

impl MockTransport {
    fn push(&self, steps: Vec<Step>) {
        self.streams.lock().expect("streams").push_back(steps);
    }

    fn fail_listing_with(&self, status: u16) {
        *self.list_status.lock().expect("status") = Some(status);
    }

    fn opened(&self) -> Vec<ChatRequest> {
        self.opened.lock().expect("opened").clone()
    }
}

#[async_trait]
impl ModelTransport for MockTransport {
    async fn open_stream(
        &self,
        _provider: ProviderId,
        request: &ChatRequest,
        _credential: &Credential,
    ) -> Result<ProviderStream, ApiError> {
        self.opened.lock().expect("opened").push(request.clone());
        let steps = self
            .streams
            .lock()
            .expect("streams")
            .pop_front()
            .ok_or_else(|| ApiError::Status(500, "no stream queued".into()))?;
        let steps: VecDeque<Step> = steps.into();
        Ok(Box::pin(futures::stream::unfold(steps, |mut steps| async move {
            match steps.pop_front()? {
                Step::Chunk(chunk) => Some((Ok(chunk), steps)),
                Step::Hang => {
                    futures::future::pending::<()>().await;
                    None
                }
            }
        })))
    }

    async fn list_models(
        &self,
        _provider: ProviderId,
        _credential: &Credential,
    ) -> Result<Vec<RemoteModel>, ApiError> {
        if let Some(status) = *self.list_status.lock().expect("status") {
            return Err(ApiError::Status(status, "rejected".into()));
        }
        Ok(vec![RemoteModel {
            id: "gpt-mock".into(),
            display_name: "GPT Mock".into(),
            created_at: None,
        }])
    }
}

/// Identity adapter whose authorize step succeeds or fails on demand.
struct ScriptedIdentity {
    provider: ProviderId,
    authorize_error: Option<&'static str>,
}

#[async_trait]
impl OAuthAdapter for ScriptedIdentity {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn authorize(&self) -> Result<AuthorizeOutcome, AuthError> {
        if let Some(message) = self.authorize_error {
            return Err(AuthError::AuthFailed(message.into()));
        }
        Ok(AuthorizeOutcome {
            tokens: OAuthTokens {
                access_token: "access".into(),
                refresh_token: Some("refresh".into()),
                id_token: None,
                expires_at: None,
                scopes: None,
            },
            profile: OAuthProfile {
                id: format!("{}-account", self.provider),
                email: None,
                name: None,
                avatar: None,
            },
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<OAuthTokens, AuthError> {
        Err(AuthError::RefreshFailed("not scripted".into()))
    }

    async fn fetch_profile(&self, _tokens: &OAuthTokens) -> Result<OAuthProfile, AuthError> {
        Err(AuthError::Invalid("not scripted".into()))
    }
}

struct ExplodingTool;

#[async_trait]
impl Tool for ExplodingTool {
    fn name(&self) -> &str {
        "explode"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "explode".into(),
            description: "always fails".into(),
            parameters: json!({"type": "object"}),
        }
    }

    async fn execute(&self, _input: &Value, _context: &ToolContext) -> Result<Value, ToolError> {
        Err(ToolError::ExecutionFailed("kaboom".into()))
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(String, Value)>>,
    arrived: Notify,
}

impl Recorder {
    fn chat_events(&self, request_id: &str) -> Vec<Value> {
        self.events
            .lock()
            .expect("events")
            .iter()
            .filter(|(name, payload)| name == CHAT_EVENT && payload["requestId"] == request_id)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    async fn until_terminal(&self, request_id: &str) -> Vec<Value> {
        let wait = async {
            loop {
                let arrived = self.arrived.notified();
                let events = self.chat_events(request_id);
                if events.iter().any(|e| {
                    matches!(e["type"].as_str(), Some("done" | "error" | "cancelled"))
                }) {
                    return events;
                }
                arrived.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("terminal event within 5s")
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: &str, payload: Value) {
        self.events
            .lock()
            .expect("events")
            .push((event.to_string(), payload));
        self.arrived.notify_waiters();
    }
}

struct Harness {
    _dir: TempDir,
    transport: Arc<MockTransport>,
    recorder: Arc<Recorder>,
    bridge: Bridge,
}

fn harness(anthropic_error: Option<&'static str>) -> Harness {
    let dir = TempDir::new("bridge");
    let transport = Arc::new(MockTransport::default());
    let oauth = Arc::new(OAuthManager::new(
        CredentialStore::in_dir(dir.path()),
        AdapterSet::new(
            Arc::new(ScriptedIdentity {
                provider: ProviderId::OpenAi,
                authorize_error: None,
            }),
            Arc::new(ScriptedIdentity {
                provider: ProviderId::Anthropic,
                authorize_error: anthropic_error,
            }),
        ),
    ));
    let registry = Arc::new(ModelRegistry::new(
        dir.path(),
        transport.clone(),
        oauth.clone(),
        3_600_000,
    ));
    let builtins: Vec<Arc<dyn Tool>> = vec![Arc::new(ExplodingTool)];
    let catalog = Arc::new(ToolCatalog::with_builtins(
        dir.path(),
        &ToolsConfig::default(),
        builtins,
    ));
    let chat = ChatController::new(ChatDeps {
        registry: registry.clone(),
        transport: transport.clone(),
        catalog: catalog.clone(),
        dispatcher: ToolDispatcher::new(Duration::from_millis(200)),
        settings: JsonDocument::in_dir(dir.path()),
        config: ChatConfig::default(),
        default_workspace: dir.path().to_path_buf(),
    });
    let bridge = Bridge::new(oauth, registry, chat, catalog, JsonDocument::in_dir(dir.path()));
    let recorder = Arc::new(Recorder::default());
    bridge.attach_surface(recorder.clone());
    Harness {
        _dir: dir,
        transport,
        recorder,
        bridge,
    }
}

async fn ready_for_chat(h: &Harness) {
    let saved = h
        .bridge
        .invoke(
            "models.providers.save",
            json!({"provider": "openai", "source": "manual", "token": "sk-live-abcdef123456"}),
        )
        .await;
    assert_eq!(saved["success"], true, "{saved}");
    assert_eq!(saved["data"][0]["token"], "sk-...3456");
    let configured = h
        .bridge
        .invoke("chat.configure", json!({"model": "gpt-mock"}))
        .await;
    assert_eq!(configured["success"], true);
}

fn text(delta: &str) -> Step {
    Step::Chunk(StreamChunk::TextDelta(delta.into()))
}

fn finished(reason: &str) -> Step {
    Step::Chunk(StreamChunk::Finished {
        reason: reason.into(),
    })
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_key_rejected_with_401_is_invalid_token() {
    let h = harness(None);
    h.transport.fail_listing_with(401);
    let reply = h
        .bridge
        .invoke("models.validate", json!({"provider": "openai", "token": "sk-test"}))
        .await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"], json!({"valid": false, "error": "invalid_token"}));
}

#[tokio::test]
async fn failed_authorization_leaves_provider_unlinked() {
    let h = harness(Some("consent denied"));
    let reply = h
        .bridge
        .invoke("auth.linkProvider", json!({"provider": "anthropic"}))
        .await;
    assert_eq!(reply["success"], false);
    assert!(reply["error"]
        .as_str()
        .is_some_and(|message| message.contains("consent denied")));

    let linked = h.bridge.invoke("auth.getLinkedProviders", Value::Null).await;
    let providers: Vec<&str> = linked["data"]
        .as_array()
        .expect("linked list")
        .iter()
        .filter_map(|entry| entry["provider"].as_str())
        .collect();
    assert!(!providers.contains(&"anthropic"));
}

#[tokio::test]
async fn failing_tool_result_keeps_call_id_and_stream_continues() {
    let h = harness(None);
    ready_for_chat(&h).await;
    h.transport.push(vec![
        Step::Chunk(StreamChunk::ToolCall(ToolCall {
            id: "tc1".into(),
            name: "explode".into(),
            input: json!({}),
        })),
        finished("tool_calls"),
    ]);
    h.transport.push(vec![text("recovered"), finished("stop")]);

    let sent = h
        .bridge
        .invoke("chat.send", json!({"requestId": "req-1", "prompt": "try it"}))
        .await;
    assert_eq!(sent["success"], true);

    let events = h.recorder.until_terminal("req-1").await;
    let result = events
        .iter()
        .find(|e| e["type"] == "tool-result")
        .expect("tool-result event");
    assert_eq!(result["id"], "tc1");
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().is_some_and(|e| e.contains("kaboom")));

    let last = events.last().expect("terminal");
    assert_eq!(last["type"], "done");
    assert_eq!(last["text"], "recovered");
    assert_eq!(h.transport.opened().len(), 2);
}

#[tokio::test]
async fn events_for_one_request_arrive_in_production_order() {
    let h = harness(None);
    ready_for_chat(&h).await;
    h.transport
        .push(vec![text("a"), text("b"), finished("stop")]);
    h.bridge
        .invoke("chat.send", json!({"requestId": "ordered", "prompt": "go"}))
        .await;

    let events = h.recorder.until_terminal("ordered").await;
    let seqs: Vec<u64> = events.iter().filter_map(|e| e["seq"].as_u64()).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
    let shape: Vec<(String, String)> = events
        .iter()
        .map(|e| {
            (
                e["type"].as_str().unwrap_or_default().to_string(),
                e["text"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            ("text-delta".to_string(), "a".to_string()),
            ("text-delta".to_string(), "b".to_string()),
            ("done".to_string(), "ab".to_string()),
        ]
    );
}

#[tokio::test]
async fn duplicate_request_id_never_opens_a_second_stream() {
    let h = harness(None);
    ready_for_chat(&h).await;
    h.transport.push(vec![Step::Hang]);
    h.transport.push(vec![text("second"), finished("stop")]);

    let first = h
        .bridge
        .invoke("chat.send", json!({"requestId": "dup", "prompt": "one"}))
        .await;
    assert_eq!(first["success"], true);
    let second = h
        .bridge
        .invoke("chat.send", json!({"requestId": "dup", "prompt": "two"}))
        .await;
    assert_eq!(second["success"], false);
    assert_eq!(h.transport.opened().len(), 1);

    h.bridge.invoke("chat.cancel", json!({"requestId": "dup"})).await;
    h.recorder.until_terminal("dup").await;
}

#[tokio::test]
async fn cancel_twice_and_after_completion_is_silent() {
    let h = harness(None);
    ready_for_chat(&h).await;
    h.transport.push(vec![text("partial"), Step::Hang]);

    h.bridge
        .invoke("chat.send", json!({"requestId": "c1", "prompt": "long"}))
        .await;
    let first = h.bridge.invoke("chat.cancel", json!({"requestId": "c1"})).await;
    let second = h.bridge.invoke("chat.cancel", json!({"requestId": "c1"})).await;
    assert_eq!(first["success"], true);
    assert_eq!(second, json!({"success": true, "data": {"cancelled": false}}));

    let events = h.recorder.until_terminal("c1").await;
    // Give a stray second terminal a chance to show up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events_after = h.recorder.chat_events("c1");
    assert_eq!(events.len(), events_after.len());
    let terminals = events_after
        .iter()
        .filter(|e| matches!(e["type"].as_str(), Some("done" | "error" | "cancelled")))
        .count();
    assert_eq!(terminals, 1);
    assert_eq!(events_after.last().expect("terminal")["type"], "cancelled");

    h.transport.push(vec![text("ok"), finished("stop")]);
    h.bridge
        .invoke("chat.send", json!({"requestId": "c2", "prompt": "short"}))
        .await;
    h.recorder.until_terminal("c2").await;
    let late = h.bridge.invoke("chat.cancel", json!("c2")).await;
    assert_eq!(late, json!({"success": true, "data": {"cancelled": false}}));
}
