//! Default configuration constants and provider endpoint tables.

use super::types::ProviderEndpoints;
use crate::types::ProviderId;

/// Embedded `chatbridge.toml` written by `chatbridge init-config`.
pub(super) const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/chatbridge.toml");
/// Directory name under the config root for bootstrap config and data.
pub(super) const APP_DIR_NAME: &str = "chatbridge";
pub(super) const CONFIG_FILE_NAME: &str = "chatbridge.toml";

pub(super) const DEFAULT_API_TIMEOUT_SECS: u64 = 120;
pub(super) const DEFAULT_REFRESH_LOOKAHEAD_SECS: u64 = 60;
pub(super) const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;
pub(super) const DEFAULT_STALENESS_HOURS: u64 = 24;
pub(super) const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
pub(super) const DEFAULT_EVENT_BUFFER: usize = 256;
pub(super) const DEFAULT_ABORT_GRACE_MS: u64 = 2_000;
pub(super) const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 120;
pub(super) const DEFAULT_MAX_TOOL_OUTPUT_BYTES: usize = 16 * 1024;

/// Built-in endpoints for one provider.
pub(super) fn default_endpoints(provider: ProviderId) -> ProviderEndpoints {
    match provider {
        ProviderId::OpenAi => ProviderEndpoints {
            base_url: "https://api.openai.com/v1".into(),
            authorize_url: "https://auth.openai.com/oauth/authorize".into(),
            token_url: "https://auth.openai.com/oauth/token".into(),
            profile_url: "https://auth.openai.com/userinfo".into(),
            client_id: "app_EMoamEEZ73f0CkXaXp7hrann".into(),
            callback_port: 1455,
        },
        ProviderId::Anthropic => ProviderEndpoints {
            base_url: "https://api.anthropic.com".into(),
            authorize_url: "https://claude.ai/oauth/authorize".into(),
            token_url: "https://console.anthropic.com/v1/oauth/token".into(),
            profile_url: "https://api.anthropic.com/api/oauth/profile".into(),
            client_id: "9d1c250a-e61b-44d9-88ed-5944d1962f5e".into(),
            callback_port: 0,
        },
    }
}
