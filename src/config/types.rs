//! Configuration data model.
//!
//! Struct definitions and their defaults. Source resolution and env overrides
//! live in `config::mod`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::{
    default_endpoints, DEFAULT_ABORT_GRACE_MS, DEFAULT_API_TIMEOUT_SECS,
    DEFAULT_CALLBACK_TIMEOUT_SECS, DEFAULT_EVENT_BUFFER, DEFAULT_MAX_TOOL_OUTPUT_BYTES,
    DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_REFRESH_LOOKAHEAD_SECS, DEFAULT_SHELL_TIMEOUT_SECS,
    DEFAULT_STALENESS_HOURS,
};
use crate::types::ProviderId;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub models: ModelsConfig,
    pub chat: ChatConfig,
    pub tools: ToolsConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for the persisted JSON documents. Resolved at load time.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub api_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

impl NetworkConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Tokens expiring within this window are treated as expired.
    pub refresh_lookahead_secs: u64,
    /// How long the loopback listener waits for the browser redirect.
    pub callback_timeout_secs: u64,
    /// Launch the system browser during authorize.
    pub open_browser: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_lookahead_secs: DEFAULT_REFRESH_LOOKAHEAD_SECS,
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
            open_browser: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Cached model lists older than this are re-fetched on auto-refresh.
    pub staleness_hours: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            staleness_hours: DEFAULT_STALENESS_HOURS,
        }
    }
}

impl ModelsConfig {
    pub fn staleness_ms(&self) -> i64 {
        (self.staleness_hours as i64).saturating_mul(3_600_000)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Provider round trips allowed per turn.
    pub max_tool_rounds: usize,
    /// Capacity of each request's event channel.
    pub event_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Grace period for a handler to stop after its abort signal fires.
    pub abort_grace_ms: u64,
    pub shell_timeout_secs: u64,
    /// Tool output returned to the model is truncated past this size.
    pub max_output_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            abort_grace_ms: DEFAULT_ABORT_GRACE_MS,
            shell_timeout_secs: DEFAULT_SHELL_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_TOOL_OUTPUT_BYTES,
        }
    }
}

/// Model API and identity endpoints for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderEndpoints {
    /// Model API base URL.
    pub base_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub client_id: String,
    /// Loopback port for the OAuth redirect; 0 picks an ephemeral port.
    pub callback_port: u16,
}

/// `[providers.openai]` / `[providers.anthropic]` tables; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct EndpointOverrides {
    pub base_url: Option<String>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub profile_url: Option<String>,
    pub client_id: Option<String>,
    pub callback_port: Option<u16>,
}

impl EndpointOverrides {
    fn apply(self, mut endpoints: ProviderEndpoints) -> ProviderEndpoints {
        if let Some(v) = self.base_url {
            endpoints.base_url = v;
        }
        if let Some(v) = self.authorize_url {
            endpoints.authorize_url = v;
        }
        if let Some(v) = self.token_url {
            endpoints.token_url = v;
        }
        if let Some(v) = self.profile_url {
            endpoints.profile_url = v;
        }
        if let Some(v) = self.client_id {
            endpoints.client_id = v;
        }
        if let Some(v) = self.callback_port {
            endpoints.callback_port = v;
        }
        endpoints
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ProvidersFile")]
pub struct ProvidersConfig {
    pub openai: ProviderEndpoints,
    pub anthropic: ProviderEndpoints,
}

impl ProvidersConfig {
    pub fn get(&self, provider: ProviderId) -> &ProviderEndpoints {
        match provider {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
        }
    }

    pub fn get_mut(&mut self, provider: ProviderId) -> &mut ProviderEndpoints {
        match provider {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Anthropic => &mut self.anthropic,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersFile::default().into()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ProvidersFile {
    openai: EndpointOverrides,
    anthropic: EndpointOverrides,
}

impl From<ProvidersFile> for ProvidersConfig {
    fn from(file: ProvidersFile) -> Self {
        Self {
            openai: file.openai.apply(default_endpoints(ProviderId::OpenAi)),
            anthropic: file.anthropic.apply(default_endpoints(ProviderId::Anthropic)),
        }
    }
}
