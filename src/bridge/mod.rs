//! Invoke/push boundary between a UI surface and the backend services.
//!
//! Every invoke-style call goes through [`Bridge::invoke`], which never
//! fails: results come back as `{success: true, data}` or
//! `{success: false, error}`. Push events (`chat:event`, `models:changed`)
//! go to whichever [`EventSink`] was last attached.

mod sink;
pub mod stdio;

pub use sink::{EventSink, CHAT_EVENT, MODELS_CHANGED};

use crate::auth::OAuthManager;
use crate::chat::{ChatController, ChatSendRequest, SessionConfig};
use crate::error::{ApiError, BridgeError};
use crate::models::{ModelRegistry, SaveProviderRequest};
use crate::settings::AppSettings;
use crate::store::JsonDocument;
use crate::tools::ToolCatalog;
use crate::types::ProviderId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sink::SurfaceSlot;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

pub struct Bridge {
    oauth: Arc<OAuthManager>,
    registry: Arc<ModelRegistry>,
    chat: ChatController,
    catalog: Arc<ToolCatalog>,
    settings: JsonDocument<AppSettings>,
    surface: Arc<SurfaceSlot>,
}

impl Bridge {
    /// Must be called inside a Tokio runtime: the `models:changed` forwarder
    /// is spawned here.
    pub fn new(
        oauth: Arc<OAuthManager>,
        registry: Arc<ModelRegistry>,
        chat: ChatController,
        catalog: Arc<ToolCatalog>,
        settings: JsonDocument<AppSettings>,
    ) -> Self {
        let surface = Arc::new(SurfaceSlot::default());
        spawn_models_forwarder(registry.subscribe(), surface.clone());
        Self {
            oauth,
            registry,
            chat,
            catalog,
            settings,
            surface,
        }
    }

    /// Route push events to `sink`, replacing any previous surface.
    pub fn attach_surface(&self, sink: Arc<dyn EventSink>) {
        self.surface.replace(Some(sink));
        debug!("event surface attached");
    }

    pub fn detach_surface(&self) {
        self.surface.replace(None);
        debug!("event surface detached");
    }

    /// Run one invoke-style call.
    pub async fn invoke(&self, method: &str, params: Value) -> Value {
        debug!(method, "bridge invoke");
        match self.dispatch(method, params).await {
            Ok(data) => json!({ "success": true, "data": data }),
            Err(err) => {
                if err.is_programmer_error() {
                    error!(method, error = %err, "bridge call rejected");
                } else {
                    warn!(method, error = %err, "bridge call failed");
                }
                json!({ "success": false, "error": err.to_string() })
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        match method {
            // -- auth --------------------------------------------------------
            "auth.login" => {
                let provider: Option<ProviderId> = optional_arg(&params, "provider")?;
                let session = self.oauth.login(provider.unwrap_or(ProviderId::OpenAi)).await?;
                reply(session)
            }
            "auth.logout" => {
                self.oauth.logout().await?;
                Ok(Value::Null)
            }
            "auth.getUser" => reply(self.oauth.get_user().await),
            "auth.linkProvider" => {
                let provider: ProviderId = arg(&params, "provider")?;
                reply(self.oauth.link_provider(provider).await?)
            }
            "auth.unlinkProvider" => {
                let provider: ProviderId = arg(&params, "provider")?;
                self.oauth.unlink_provider(provider).await?;
                Ok(Value::Null)
            }
            "auth.getLinkedProviders" => reply(self.oauth.get_linked_providers().await),

            // -- chat --------------------------------------------------------
            "chat.configure" => {
                let config: SessionConfig = arg(&params, "config")?;
                self.chat.configure(config);
                Ok(Value::Null)
            }
            "chat.send" => {
                let request: ChatSendRequest = arg(&params, "request")?;
                let request_id = request.request_id.clone();
                let stream = self.chat.send(request).await?;
                spawn_chat_forwarder(stream, self.surface.clone());
                Ok(json!({ "requestId": request_id }))
            }
            "chat.cancel" => {
                let request_id: String = arg(&params, "requestId")?;
                Ok(json!({ "cancelled": self.chat.cancel(&request_id) }))
            }
            "chat.getModels" => reply(self.chat.get_models().await),
            "chat.getTools" => reply(self.chat.get_tools().await),
            "chat.getAgents" => reply(self.chat.get_agents().await),
            "chat.clear" => {
                self.chat.clear();
                Ok(Value::Null)
            }

            // -- models ------------------------------------------------------
            "models.providers.load" => {
                let auto_refresh: Option<bool> = optional_arg(&params, "autoRefresh")?;
                reply(self.registry.load_providers(auto_refresh.unwrap_or(false)).await)
            }
            "models.providers.save" => {
                let request: SaveProviderRequest = arg(&params, "request")?;
                reply(self.registry.save_provider(request).await?)
            }
            "models.providers.remove" => {
                let provider: ProviderId = arg(&params, "provider")?;
                Ok(json!({ "removed": self.registry.remove_provider(provider).await? }))
            }
            "models.validate" => {
                let ValidateParams { provider, token } = parse(params)?;
                let provider = provider.parse::<ProviderId>().map_err(|_| {
                    BridgeError::Api(ApiError::Unsupported(provider.clone()))
                })?;
                reply(self.registry.validate_token(provider, &token).await)
            }
            "models.toggle" => {
                let ModelParams {
                    provider,
                    model_id,
                    enabled,
                } = parse(params)?;
                self.registry
                    .toggle_model(provider, &model_id, enabled.unwrap_or(true))
                    .await?;
                Ok(Value::Null)
            }
            "models.setDefault" => {
                let ModelParams {
                    provider, model_id, ..
                } = parse(params)?;
                self.registry.set_default_model(provider, &model_id).await?;
                Ok(Value::Null)
            }

            // -- tools and settings -------------------------------------------
            "tools.setEnabled" => {
                let ToolToggleParams { name, enabled } = parse(params)?;
                self.catalog.set_enabled(&name, enabled).await?;
                Ok(Value::Null)
            }
            "settings.get" => reply(self.settings.load().await),
            "settings.save" => {
                let settings: AppSettings = arg(&params, "settings")?;
                self.settings.save(&settings).await?;
                Ok(Value::Null)
            }

            other => Err(BridgeError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct ValidateParams {
    provider: String,
    #[serde(default)]
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelParams {
    provider: ProviderId,
    model_id: String,
    #[serde(default)]
    enabled: Option<bool>,
}

#[derive(Deserialize)]
struct ToolToggleParams {
    name: String,
    enabled: bool,
}

fn reply<T: Serialize>(data: T) -> Result<Value, BridgeError> {
    serde_json::to_value(data).map_err(|e| BridgeError::InvalidParams(e.to_string()))
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, BridgeError> {
    serde_json::from_value(params).map_err(|e| BridgeError::InvalidParams(e.to_string()))
}

/// Single-argument calls accept either the bare value or `{key: value}`.
fn arg<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, BridgeError> {
    let value = match params {
        Value::Object(map) if map.contains_key(key) => map[key].clone(),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| BridgeError::InvalidParams(format!("{key}: {e}")))
}

fn optional_arg<T: DeserializeOwned>(params: &Value, key: &str) -> Result<Option<T>, BridgeError> {
    match params {
        Value::Null => Ok(None),
        Value::Object(map) if !map.contains_key(key) => Ok(None),
        _ => arg(params, key).map(Some),
    }
}

fn spawn_chat_forwarder(mut stream: crate::chat::ChatEventStream, surface: Arc<SurfaceSlot>) {
    tokio::spawn(async move {
        while let Some(envelope) = stream.recv().await {
            match serde_json::to_value(&envelope) {
                Ok(payload) => surface.emit(CHAT_EVENT, payload),
                Err(err) => warn!(request_id = %envelope.request_id, error = %err, "unserializable chat event"),
            }
        }
    });
}

fn spawn_models_forwarder(
    mut changes: broadcast::Receiver<Vec<crate::models::EnabledModel>>,
    surface: Arc<SurfaceSlot>,
) {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(models) => match serde_json::to_value(&models) {
                    Ok(payload) => surface.emit(MODELS_CHANGED, payload),
                    Err(err) => warn!(error = %err, "unserializable model list"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "models:changed receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::manager::tests::{manager_with, FakeAdapter};
    use crate::chat::ChatDeps;
    use crate::config::{ChatConfig, ToolsConfig};
    use crate::testsupport::{finished, text, ScriptStep, ScriptedTransport, TestTempDir};
    use crate::tools::ToolDispatcher;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records pushed events in arrival order.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<(String, Value)>>,
        notify: tokio::sync::Notify,
    }

    impl RecordingSink {
        pub fn named(&self, event: &str) -> Vec<Value> {
            self.events
                .lock()
                .expect("events lock")
                .iter()
                .filter(|(name, _)| name == event)
                .map(|(_, payload)| payload.clone())
                .collect()
        }

        /// Wait until a chat event with a terminal type arrives for `request_id`.
        pub async fn wait_terminal(&self, request_id: &str) -> Vec<Value> {
            loop {
                let notified = self.notify.notified();
                let events: Vec<Value> = self
                    .named(CHAT_EVENT)
                    .into_iter()
                    .filter(|e| e["requestId"] == request_id)
                    .collect();
                if events
                    .iter()
                    .any(|e| matches!(e["type"].as_str(), Some("done" | "error" | "cancelled")))
                {
                    return events;
                }
                notified.await;
            }
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &str, payload: Value) {
            self.events
                .lock()
                .expect("events lock")
                .push((event.to_string(), payload));
            self.notify.notify_waiters();
        }
    }

    struct Fixture {
        _dir: TestTempDir,
        transport: Arc<ScriptedTransport>,
        bridge: Bridge,
        sink: Arc<RecordingSink>,
    }

    pub(crate) fn build_bridge(
        dir: &TestTempDir,
        anthropic: FakeAdapter,
    ) -> (Bridge, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let (manager, _, _) = manager_with(dir, FakeAdapter::new(ProviderId::OpenAi), anthropic);
        let oauth = Arc::new(manager);
        let registry = Arc::new(ModelRegistry::new(
            dir.path(),
            transport.clone(),
            oauth.clone(),
            60_000,
        ));
        let catalog = Arc::new(ToolCatalog::new(dir.path(), &ToolsConfig::default()));
        let chat = ChatController::new(ChatDeps {
            registry: registry.clone(),
            transport: transport.clone(),
            catalog: catalog.clone(),
            dispatcher: ToolDispatcher::new(Duration::from_millis(100)),
            settings: JsonDocument::in_dir(dir.path()),
            config: ChatConfig::default(),
            default_workspace: dir.path().to_path_buf(),
        });
        let bridge = Bridge::new(
            oauth,
            registry,
            chat,
            catalog,
            JsonDocument::in_dir(dir.path()),
        );
        (bridge, transport)
    }

    fn fixture(anthropic: FakeAdapter) -> Fixture {
        let dir = TestTempDir::new("bridge");
        let (bridge, transport) = build_bridge(&dir, anthropic);
        let sink = Arc::new(RecordingSink::default());
        bridge.attach_surface(sink.clone());
        Fixture {
            _dir: dir,
            transport,
            bridge,
            sink,
        }
    }

    async fn configure_openai(fx: &Fixture) {
        fx.transport
            .set_models(ProviderId::OpenAi, Ok(vec!["gpt-a"]));
        let saved = fx
            .bridge
            .invoke(
                "models.providers.save",
                json!({"provider": "openai", "source": "manual", "token": "sk-test-0123456789"}),
            )
            .await;
        assert_eq!(saved["success"], true, "{saved}");
        let configured = fx
            .bridge
            .invoke("chat.configure", json!({"model": "gpt-a"}))
            .await;
        assert_eq!(configured["success"], true);
    }

    #[tokio::test]
    async fn validate_reports_invalid_token_for_401() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        fx.transport.set_models(ProviderId::OpenAi, Err(401));
        let reply = fx
            .bridge
            .invoke("models.validate", json!({"provider": "openai", "token": "sk-test"}))
            .await;
        assert_eq!(
            reply,
            json!({"success": true, "data": {"valid": false, "error": "invalid_token"}})
        );
    }

    #[tokio::test]
    async fn validate_rejects_unknown_provider() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        let reply = fx
            .bridge
            .invoke("models.validate", json!({"provider": "acme", "token": "x"}))
            .await;
        assert_eq!(reply["success"], false);
        assert!(reply["error"].as_str().is_some_and(|e| e.contains("acme")));
    }

    #[tokio::test]
    async fn failed_link_is_reported_and_leaves_provider_unlinked() {
        let mut anthropic = FakeAdapter::new(ProviderId::Anthropic);
        anthropic.authorize_error = Some("user closed the window".into());
        let fx = fixture(anthropic);

        let reply = fx.bridge.invoke("auth.linkProvider", json!("anthropic")).await;
        assert_eq!(reply["success"], false);
        assert!(reply["error"]
            .as_str()
            .is_some_and(|e| e.contains("user closed the window")));

        let linked = fx.bridge.invoke("auth.getLinkedProviders", Value::Null).await;
        assert_eq!(linked, json!({"success": true, "data": []}));
    }

    #[tokio::test]
    async fn link_then_unlink_twice() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        let reply = fx
            .bridge
            .invoke("auth.linkProvider", json!({"provider": "anthropic"}))
            .await;
        assert_eq!(reply["success"], true);
        assert_eq!(reply["data"]["provider"], "anthropic");

        for _ in 0..2 {
            let reply = fx
                .bridge
                .invoke("auth.unlinkProvider", json!({"provider": "anthropic"}))
                .await;
            assert_eq!(reply, json!({"success": true, "data": null}));
        }
        let linked = fx.bridge.invoke("auth.getLinkedProviders", Value::Null).await;
        assert_eq!(linked["data"], json!([]));
    }

    #[tokio::test]
    async fn save_pushes_models_changed() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        configure_openai(&fx).await;
        // The forwarder runs on its own task.
        for _ in 0..50 {
            if !fx.sink.named(MODELS_CHANGED).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let pushed = fx.sink.named(MODELS_CHANGED);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0][0]["id"], "gpt-a");
    }

    #[tokio::test]
    async fn chat_events_are_pushed_in_order() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        configure_openai(&fx).await;
        fx.transport
            .push_script(vec![text("a"), text("b"), finished("stop")]);

        let reply = fx
            .bridge
            .invoke("chat.send", json!({"requestId": "r1", "prompt": "hi"}))
            .await;
        assert_eq!(reply, json!({"success": true, "data": {"requestId": "r1"}}));

        let events = fx.sink.wait_terminal("r1").await;
        let kinds: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
        assert_eq!(kinds, vec!["text-delta", "text-delta", "done"]);
        assert_eq!(events[0]["text"], "a");
        assert_eq!(events[1]["text"], "b");
    }

    #[tokio::test]
    async fn duplicate_send_and_repeated_cancel() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        configure_openai(&fx).await;
        fx.transport.push_script(vec![ScriptStep::Hang]);

        let first = fx
            .bridge
            .invoke("chat.send", json!({"requestId": "r1", "prompt": "hi"}))
            .await;
        assert_eq!(first["success"], true);
        let second = fx
            .bridge
            .invoke("chat.send", json!({"requestId": "r1", "prompt": "again"}))
            .await;
        assert_eq!(second["success"], false);

        let cancel = fx.bridge.invoke("chat.cancel", json!("r1")).await;
        assert_eq!(cancel["data"]["cancelled"], true);
        let again = fx.bridge.invoke("chat.cancel", json!({"requestId": "r1"})).await;
        assert_eq!(again, json!({"success": true, "data": {"cancelled": false}}));

        let events = fx.sink.wait_terminal("r1").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "cancelled");
    }

    #[tokio::test]
    async fn settings_and_agents_round_trip() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        let saved = fx
            .bridge
            .invoke(
                "settings.save",
                json!({"theme": "dark", "agents": [{"id": "rev", "name": "Reviewer"}]}),
            )
            .await;
        assert_eq!(saved["success"], true);

        let agents = fx.bridge.invoke("chat.getAgents", Value::Null).await;
        let ids: Vec<&str> = agents["data"]
            .as_array()
            .expect("agents")
            .iter()
            .filter_map(|a| a["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["default", "rev"]);

        let reserved = fx
            .bridge
            .invoke("settings.save", json!({"agents": [{"id": "default", "name": "X"}]}))
            .await;
        assert_eq!(reserved["success"], false);
        let settings = fx.bridge.invoke("settings.get", Value::Null).await;
        assert_eq!(settings["data"]["theme"], "dark");
    }

    #[tokio::test]
    async fn tools_can_be_disabled() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        let reply = fx
            .bridge
            .invoke("tools.setEnabled", json!({"name": "run_shell", "enabled": false}))
            .await;
        assert_eq!(reply["success"], true);
        let tools = fx.bridge.invoke("chat.getTools", Value::Null).await;
        let shell = tools["data"]
            .as_array()
            .expect("tools")
            .iter()
            .find(|t| t["name"] == "run_shell")
            .cloned()
            .expect("run_shell listed");
        assert_eq!(shell["enabled"], false);
    }

    #[tokio::test]
    async fn unknown_method_is_a_failure_value() {
        let fx = fixture(FakeAdapter::new(ProviderId::Anthropic));
        let reply = fx.bridge.invoke("chat.explode", Value::Null).await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "unknown method `chat.explode`");
    }
}
