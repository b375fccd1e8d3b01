//! Chat session controller: session config, history and in-flight requests.

use super::agents::{find_agent, list_agents};
use super::emitter::{ChatEventStream, RequestEvents, Terminal};
use super::history::ConversationHistory;
use super::schema::{render_prompt, ChatSendRequest, SessionConfig};
use super::turn::{Turn, TurnOutcome};
use crate::abort::AbortController;
use crate::api::ModelTransport;
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::models::{EnabledModel, ModelRegistry, RegistryError};
use crate::settings::{AgentDefinition, AppSettings};
use crate::store::JsonDocument;
use crate::tools::{ToolCatalog, ToolDispatcher, ToolSummary};
use crate::types::{ChatRequest, Message};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Collaborators shared by every turn.
pub struct ChatDeps {
    pub registry: Arc<ModelRegistry>,
    pub transport: Arc<dyn ModelTransport>,
    pub catalog: Arc<ToolCatalog>,
    pub dispatcher: ToolDispatcher,
    pub settings: JsonDocument<AppSettings>,
    pub config: ChatConfig,
    /// Workspace used when the session does not name one.
    pub default_workspace: PathBuf,
}

struct InFlight {
    controller: AbortController,
    /// Distinguishes reuses of the same request id.
    generation: u64,
    phase: Phase,
}

/// The slot is held through every phase; only the turn task releases it,
/// after its terminal event is out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Cancelled,
    Finishing,
}

#[derive(Default)]
struct ControllerState {
    session: Option<SessionConfig>,
    history: ConversationHistory,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChatController {
    deps: Arc<ChatDeps>,
    state: Arc<Mutex<ControllerState>>,
}

impl ChatController {
    pub fn new(deps: ChatDeps) -> Self {
        Self {
            deps: Arc::new(deps),
            state: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    /// Replace the active session. Requests already in flight keep the
    /// configuration they started with. Switching conversation clears history.
    pub fn configure(&self, config: SessionConfig) {
        let mut state = self.lock();
        let switched = state
            .session
            .as_ref()
            .map_or(true, |current| current.conversation_id != config.conversation_id);
        if switched {
            state.history.clear();
        }
        debug!(model = %config.model, agent = ?config.agent, switched, "chat session configured");
        state.session = Some(config);
    }

    pub fn session(&self) -> Option<SessionConfig> {
        self.lock().session.clone()
    }

    /// Start a turn and return its event stream. The stream ends after
    /// exactly one terminal event.
    pub async fn send(&self, request: ChatSendRequest) -> Result<ChatEventStream, ChatError> {
        let request_id = request.request_id.clone();
        let (session, history, epoch, signal, generation) = {
            let mut state = self.lock();
            let session = state.session.clone().ok_or(ChatError::NotConfigured)?;
            if state.in_flight.contains_key(&request_id) {
                return Err(ChatError::DuplicateRequest(request_id));
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            let controller = AbortController::new();
            let signal = controller.signal();
            state.in_flight.insert(
                request_id.clone(),
                InFlight {
                    controller,
                    generation,
                    phase: Phase::Running,
                },
            );
            let (history, epoch) = state.history.snapshot();
            (session, history, epoch, signal, generation)
        };

        let user_message = Message::user(render_prompt(&request));
        let turn = match self
            .prepare(&request_id, &session, history, user_message.clone())
            .await
        {
            Ok(turn) => turn,
            Err(err) => {
                self.release(&request_id, generation);
                return Err(err);
            }
        };

        info!(request_id = %request_id, provider = %turn.provider, model = %turn.request.model, "chat turn started");
        let (mut events, stream) = RequestEvents::channel(&request_id, self.deps.config.event_buffer);
        let this = self.clone();
        tokio::spawn(async move {
            let TurnOutcome {
                terminal,
                transcript,
            } = turn.run(&this.deps, &mut events, &signal).await;
            if matches!(terminal, Terminal::Done { .. }) {
                let mut messages = Vec::with_capacity(transcript.len() + 1);
                messages.push(user_message);
                messages.extend(transcript);
                if !this.lock().history.append_if_current(epoch, messages) {
                    debug!(request_id = %request_id, "history cleared during turn, not appending");
                }
            }
            this.mark_finishing(&request_id, generation);
            info!(request_id = %request_id, outcome = terminal_label(&terminal), "chat turn finished");
            let finished = events.finish(terminal).await;
            this.release(&request_id, generation);
            drop(finished);
        });
        Ok(stream)
    }

    /// Abort an in-flight request. Unknown, finished or already cancelled
    /// ids are a no-op; returns whether this call cancelled the request.
    /// The id stays reserved until the turn has emitted `cancelled`.
    pub fn cancel(&self, request_id: &str) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.in_flight.get_mut(request_id) else {
            debug!(request_id, "cancel for unknown request ignored");
            return false;
        };
        if entry.phase != Phase::Running {
            debug!(request_id, phase = ?entry.phase, "cancel for winding-down request ignored");
            return false;
        }
        entry.phase = Phase::Cancelled;
        entry.controller.abort();
        info!(request_id, "chat turn cancelled");
        true
    }

    /// Drop the conversation history. In-flight turns keep their snapshot.
    pub fn clear(&self) {
        self.lock().history.clear();
        debug!("chat history cleared");
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub async fn get_models(&self) -> Vec<EnabledModel> {
        self.deps.registry.enabled_models().await
    }

    /// Tools visible from the session workspace, including disabled ones.
    pub async fn get_tools(&self) -> Vec<ToolSummary> {
        let workspace = self.workspace(self.session().as_ref());
        self.deps.catalog.merged(&workspace).await.summaries()
    }

    pub async fn get_agents(&self) -> Vec<AgentDefinition> {
        list_agents(&self.deps.settings.load().await)
    }

    async fn prepare(
        &self,
        request_id: &str,
        session: &SessionConfig,
        mut messages: Vec<Message>,
        user_message: Message,
    ) -> Result<Turn, ChatError> {
        let settings = self.deps.settings.load().await;
        let agent = find_agent(&settings, session.agent.as_deref());
        let system = session.system.clone().or(agent.system_prompt);
        let allow = session.tools.clone().or(agent.tools);

        let (provider, model) = self
            .deps
            .registry
            .resolve_model(Some(session.model.as_str()))
            .await
            .map_err(|err| match err {
                RegistryError::UnknownModel(model) => ChatError::NoModel(model),
                other => ChatError::Registry(other.to_string()),
            })?;

        let workspace = self.workspace(Some(session));
        let catalog = self.deps.catalog.merged(&workspace).await;
        let tools = catalog.definitions(allow.as_deref());
        let options = session.options.clone().unwrap_or_default();
        messages.push(user_message);

        Ok(Turn {
            request_id: request_id.to_string(),
            provider,
            request: ChatRequest {
                model,
                system,
                messages,
                tools,
                temperature: options.temperature,
                max_tokens: options.max_tokens,
            },
            allow,
            workspace,
            catalog,
        })
    }

    fn workspace(&self, session: Option<&SessionConfig>) -> PathBuf {
        session
            .and_then(|s| s.workspace.clone())
            .unwrap_or_else(|| self.deps.default_workspace.clone())
    }

    /// The turn has its terminal; later cancels are ignored.
    fn mark_finishing(&self, request_id: &str, generation: u64) {
        if let Some(entry) = self
            .lock()
            .in_flight
            .get_mut(request_id)
            .filter(|entry| entry.generation == generation)
        {
            entry.phase = Phase::Finishing;
        }
    }

    /// Drop the in-flight entry unless the id was reused by a newer request.
    fn release(&self, request_id: &str, generation: u64) {
        let mut state = self.lock();
        if state
            .in_flight
            .get(request_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            state.in_flight.remove(request_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.lock().history.len()
    }
}

fn terminal_label(terminal: &Terminal) -> &'static str {
    match terminal {
        Terminal::Done { .. } => "done",
        Terminal::Error(_) => "error",
        Terminal::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::manager::tests::{manager_with, FakeAdapter};
    use crate::chat::schema::ChatEvent;
    use crate::config::ToolsConfig;
    use crate::error::ToolError;
    use crate::models::{CredentialSource, SaveProviderRequest};
    use crate::testsupport::{finished, text, tool_call, ScriptStep, ScriptedTransport, TestTempDir};
    use crate::tools::{Tool, ToolContext};
    use crate::types::{ProviderId, Role, ToolDefinition};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct FakeTool(&'static str);

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.0
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.into(),
                description: "fake".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(&self, input: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
            match self.0 {
                "fail" => Err(ToolError::ExecutionFailed("handler blew up".into())),
                "wait" => {
                    ctx.signal.aborted().await;
                    Err(ToolError::Cancelled)
                }
                "linger" => {
                    ctx.signal.aborted().await;
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Err(ToolError::Cancelled)
                }
                _ => Ok(input.clone()),
            }
        }
    }

    struct Fixture {
        _dir: TestTempDir,
        transport: Arc<ScriptedTransport>,
        chat: ChatController,
    }

    async fn fixture_with(config: ChatConfig) -> Fixture {
        let dir = TestTempDir::new("chat");
        let transport = Arc::new(ScriptedTransport::default());
        let (manager, _, _) = manager_with(
            &dir,
            FakeAdapter::new(ProviderId::OpenAi),
            FakeAdapter::new(ProviderId::Anthropic),
        );
        let registry = Arc::new(ModelRegistry::new(
            dir.path(),
            transport.clone(),
            Arc::new(manager),
            60_000,
        ));
        transport.set_models(ProviderId::OpenAi, Ok(vec!["gpt-a", "gpt-b"]));
        registry
            .save_provider(SaveProviderRequest {
                provider: ProviderId::OpenAi,
                source: CredentialSource::Manual,
                token: Some("sk-test-0123456789".into()),
                enabled: true,
            })
            .await
            .expect("save provider");

        let builtins: Vec<Arc<dyn Tool>> = vec![
            Arc::new(FakeTool("echo")),
            Arc::new(FakeTool("fail")),
            Arc::new(FakeTool("wait")),
            Arc::new(FakeTool("linger")),
        ];
        let catalog = ToolCatalog::with_builtins(dir.path(), &ToolsConfig::default(), builtins);
        let chat = ChatController::new(ChatDeps {
            registry,
            transport: transport.clone(),
            catalog: Arc::new(catalog),
            dispatcher: ToolDispatcher::new(Duration::from_millis(200)),
            settings: JsonDocument::in_dir(dir.path()),
            config,
            default_workspace: dir.path().to_path_buf(),
        });
        chat.configure(SessionConfig {
            model: "gpt-a".into(),
            ..SessionConfig::default()
        });
        Fixture {
            _dir: dir,
            transport,
            chat,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(ChatConfig::default()).await
    }

    fn send_request(id: &str, prompt: &str) -> ChatSendRequest {
        ChatSendRequest {
            request_id: id.into(),
            prompt: prompt.into(),
            references: Vec::new(),
        }
    }

    async fn collect(mut stream: ChatEventStream) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(envelope) = stream.recv().await {
            events.push(envelope.event);
        }
        events
    }

    #[tokio::test]
    async fn text_deltas_arrive_in_order_before_done() {
        // Verifies a plain reply streams deltas then one terminal `done`.
        let fx = fixture().await;
        fx.transport
            .push_script(vec![text("a"), text("b"), finished("stop")]);

        let stream = fx.chat.send(send_request("r1", "hi")).await.expect("send");
        let events = collect(stream).await;
        assert_eq!(
            events,
            vec![
                ChatEvent::TextDelta { text: "a".into() },
                ChatEvent::TextDelta { text: "b".into() },
                ChatEvent::Done {
                    text: "ab".into(),
                    finish_reason: "stop".into(),
                },
            ]
        );
        assert_eq!(fx.chat.history_len(), 2);
        assert_eq!(fx.chat.in_flight(), 0);

        let requests = fx.transport.requests();
        assert_eq!(requests[0].1.model, "gpt-a");
        assert_eq!(requests[0].1.tools.len(), 4);
        assert_eq!(requests[0].2.secret(), "sk-test-0123456789");
    }

    #[tokio::test]
    async fn failing_tool_is_reported_and_turn_continues() {
        // Verifies a handler error becomes a tool-result with the call id and
        // the model is called again with that result.
        let fx = fixture().await;
        fx.transport
            .push_script(vec![tool_call("tc1", "fail", json!({})), finished("tool_calls")]);
        fx.transport
            .push_script(vec![text("sorry"), finished("stop")]);

        let stream = fx.chat.send(send_request("r1", "do it")).await.expect("send");
        let events = collect(stream).await;
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], ChatEvent::ToolCall { id, .. } if id == "tc1"));
        match &events[1] {
            ChatEvent::ToolResult(result) => {
                assert_eq!(result.id, "tc1");
                assert!(!result.success);
                assert!(result.error.as_deref().is_some_and(|e| e.contains("handler blew up")));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
        assert_eq!(events[2], ChatEvent::TextDelta { text: "sorry".into() });
        assert!(matches!(&events[3], ChatEvent::Done { text, .. } if text == "sorry"));

        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 2);
        let follow_up = &requests[1].1.messages;
        let tool_message = follow_up.last().expect("tool message");
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("tc1"));
        // user, assistant(tool call), tool result, final assistant
        assert_eq!(fx.chat.history_len(), 4);
    }

    #[tokio::test]
    async fn duplicate_request_id_is_rejected_while_in_flight() {
        let fx = fixture().await;
        fx.transport.push_script(vec![ScriptStep::Hang]);
        fx.transport.push_script(vec![text("unused"), finished("stop")]);

        let stream = fx.chat.send(send_request("r1", "hi")).await.expect("send");
        let err = fx
            .chat
            .send(send_request("r1", "again"))
            .await
            .expect_err("duplicate");
        assert_eq!(err, ChatError::DuplicateRequest("r1".into()));
        assert_eq!(fx.transport.requests().len(), 1);

        assert!(fx.chat.cancel("r1"));
        assert_eq!(collect(stream).await, vec![ChatEvent::Cancelled]);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_ignores_finished_requests() {
        let fx = fixture().await;
        fx.transport.push_script(vec![ScriptStep::Hang]);
        let stream = fx.chat.send(send_request("r1", "hi")).await.expect("send");

        assert!(fx.chat.cancel("r1"));
        assert!(!fx.chat.cancel("r1"));
        let events = collect(stream).await;
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(events.last(), Some(&ChatEvent::Cancelled));

        fx.transport.push_script(vec![text("ok"), finished("stop")]);
        let stream = fx.chat.send(send_request("r2", "hi")).await.expect("send");
        let events = collect(stream).await;
        assert!(!fx.chat.cancel("r2"));
        assert!(!fx.chat.cancel("never-sent"));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        // Cancelled turns leave history untouched.
        assert_eq!(fx.chat.history_len(), 2);
    }

    #[tokio::test]
    async fn cancel_reaches_a_running_tool() {
        let fx = fixture().await;
        fx.transport
            .push_script(vec![tool_call("tc1", "wait", json!({})), finished("tool_calls")]);
        let mut stream = fx.chat.send(send_request("r1", "hi")).await.expect("send");

        let first = stream.recv().await.expect("tool call event");
        assert!(matches!(first.event, ChatEvent::ToolCall { .. }));
        assert!(fx.chat.cancel("r1"));

        let rest = collect(stream).await;
        assert_eq!(rest.last(), Some(&ChatEvent::Cancelled));
        for event in &rest[..rest.len() - 1] {
            match event {
                ChatEvent::ToolResult(result) => {
                    assert_eq!(result.id, "tc1");
                    assert!(!result.success);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(fx.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn request_id_stays_reserved_until_cancelled_turn_winds_down() {
        let fx = fixture().await;
        fx.transport
            .push_script(vec![tool_call("tc1", "linger", json!({})), finished("tool_calls")]);
        fx.transport.push_script(vec![text("fresh"), finished("stop")]);
        let mut stream = fx.chat.send(send_request("r1", "hi")).await.expect("send");

        let first = stream.recv().await.expect("tool call event");
        assert!(matches!(first.event, ChatEvent::ToolCall { .. }));
        assert!(fx.chat.cancel("r1"));

        // The tool is still winding down, so the id must not be reusable yet.
        let err = fx
            .chat
            .send(send_request("r1", "again"))
            .await
            .expect_err("id still reserved");
        assert_eq!(err, ChatError::DuplicateRequest("r1".into()));
        assert!(!fx.chat.cancel("r1"));
        assert_eq!(fx.chat.in_flight(), 1);

        let rest = collect(stream).await;
        assert!(matches!(&rest[0], ChatEvent::ToolResult(result) if result.id == "tc1"));
        assert_eq!(rest.last(), Some(&ChatEvent::Cancelled));
        assert_eq!(fx.chat.in_flight(), 0);

        let events = collect(fx.chat.send(send_request("r1", "again")).await.expect("resend")).await;
        assert_eq!(
            events,
            vec![
                ChatEvent::TextDelta { text: "fresh".into() },
                ChatEvent::Done {
                    text: "fresh".into(),
                    finish_reason: "stop".into(),
                },
            ]
        );
        assert_eq!(fx.transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn clear_during_a_turn_keeps_the_new_history_empty() {
        let fx = fixture().await;
        fx.transport.push_script(vec![
            ScriptStep::Delay(Duration::from_millis(50)),
            text("late"),
            finished("stop"),
        ]);
        let stream = fx.chat.send(send_request("r1", "hi")).await.expect("send");
        fx.chat.clear();
        let events = collect(stream).await;
        assert!(matches!(events.last(), Some(ChatEvent::Done { .. })));
        assert_eq!(fx.chat.history_len(), 0);
    }

    #[tokio::test]
    async fn round_limit_ends_the_turn_with_an_error() {
        let fx = fixture_with(ChatConfig {
            max_tool_rounds: 1,
            ..ChatConfig::default()
        })
        .await;
        fx.transport
            .push_script(vec![tool_call("tc1", "echo", json!({"n": 1})), finished("tool_calls")]);
        let stream = fx.chat.send(send_request("r1", "loop")).await.expect("send");
        let events = collect(stream).await;
        assert!(matches!(events.last(), Some(ChatEvent::Error { .. })));
        assert_eq!(fx.chat.history_len(), 0);
    }

    #[tokio::test]
    async fn stream_failure_preserves_partial_output() {
        let fx = fixture().await;
        fx.transport
            .push_script(vec![text("par"), ScriptStep::Fail("connection reset".into())]);
        let stream = fx.chat.send(send_request("r1", "hi")).await.expect("send");
        let events = collect(stream).await;
        assert_eq!(events[0], ChatEvent::TextDelta { text: "par".into() });
        assert!(
            matches!(&events[1], ChatEvent::Error { message } if message.contains("connection reset"))
        );
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn unknown_model_and_missing_session_are_rejected() {
        let fx = fixture().await;
        fx.chat.configure(SessionConfig {
            model: "ghost".into(),
            ..SessionConfig::default()
        });
        let err = fx.chat.send(send_request("r1", "hi")).await.expect_err("no model");
        assert_eq!(err, ChatError::NoModel("ghost".into()));
        assert_eq!(fx.chat.in_flight(), 0);

        let fresh = ChatController {
            deps: fx.chat.deps.clone(),
            state: Arc::new(Mutex::new(ControllerState::default())),
        };
        let err = fresh.send(send_request("r1", "hi")).await.expect_err("not configured");
        assert_eq!(err, ChatError::NotConfigured);
    }

    #[tokio::test]
    async fn session_tool_allowlist_limits_definitions() {
        let fx = fixture().await;
        fx.chat.configure(SessionConfig {
            model: String::new(),
            tools: Some(vec!["echo".into()]),
            system: Some("be brief".into()),
            ..SessionConfig::default()
        });
        fx.transport.push_script(vec![finished("stop")]);
        let stream = fx.chat.send(send_request("r1", "hi")).await.expect("send");
        collect(stream).await;

        let (_, request, _) = fx.transport.requests().remove(0);
        assert_eq!(request.model, "gpt-a");
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(
            request.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["echo"]
        );
    }

    #[tokio::test]
    async fn switching_conversation_clears_history() {
        let fx = fixture().await;
        fx.transport.push_script(vec![text("one"), finished("stop")]);
        collect(fx.chat.send(send_request("r1", "hi")).await.expect("send")).await;
        assert_eq!(fx.chat.history_len(), 2);

        // Same conversation keeps history.
        fx.chat.configure(SessionConfig {
            model: "gpt-b".into(),
            ..SessionConfig::default()
        });
        assert_eq!(fx.chat.history_len(), 2);

        fx.chat.configure(SessionConfig {
            conversation_id: Some("other".into()),
            model: "gpt-b".into(),
            ..SessionConfig::default()
        });
        assert_eq!(fx.chat.history_len(), 0);
    }
}
