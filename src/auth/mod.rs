//! OAuth identity and token lifecycle.
//!
//! Adapters drive each provider's PKCE authorization-code flow; the manager
//! owns link/unlink/refresh on top of the `credentials.json` store.

mod adapter;
mod anthropic;
mod browser;
mod error;
pub(crate) mod manager;
mod openai;
mod pkce;
mod store;
mod types;

pub use adapter::{AdapterSet, AuthorizeOutcome, FlowSettings, OAuthAdapter};
pub use anthropic::AnthropicAdapter;
pub(crate) use anthropic::OAUTH_BETA;
pub use browser::{no_launcher, system_launcher, try_open_browser, BrowserLauncher};
pub use error::AuthError;
pub use manager::{OAuthManager, RefreshOutcome};
pub use openai::OpenAiAdapter;
pub use store::CredentialStore;
pub use types::{
    AuthSession, LinkState, LinkedProvider, OAuthProfile, OAuthProviderData, OAuthStorageData,
    OAuthTokens,
};

use crate::config::Config;
use std::sync::Arc;
use std::time::Duration;

/// Build the production adapters from configuration.
pub fn adapters_from_config(config: &Config, launcher: BrowserLauncher) -> AdapterSet {
    let settings = FlowSettings {
        callback_timeout: Duration::from_secs(config.auth.callback_timeout_secs.max(1)),
        lookahead_ms: (config.auth.refresh_lookahead_secs as i64).saturating_mul(1000),
        http_timeout: config.network.api_timeout(),
        launcher,
    };
    AdapterSet::new(
        Arc::new(OpenAiAdapter::new(
            config.providers.openai.clone(),
            settings.clone(),
        )),
        Arc::new(AnthropicAdapter::new(
            config.providers.anthropic.clone(),
            settings,
        )),
    )
}
