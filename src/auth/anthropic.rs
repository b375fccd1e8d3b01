//! Anthropic identity adapter.

use super::adapter::{auth_http_client, AuthorizeOutcome, CodeFlow, FlowSettings, OAuthAdapter, TokenBody};
use super::error::AuthError;
use super::types::{OAuthProfile, OAuthTokens};
use crate::config::ProviderEndpoints;
use crate::types::ProviderId;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const SCOPES: &str = "org:create_api_key user:profile user:inference";
const CALLBACK_PATH: &str = "/callback";
const EXTRA_PARAMS: &[(&str, &str)] = &[("code", "true")];
/// Beta flag required for OAuth bearer tokens on Anthropic endpoints.
pub(crate) const OAUTH_BETA: &str = "oauth-2025-04-20";

pub struct AnthropicAdapter {
    flow: CodeFlow,
}

impl AnthropicAdapter {
    pub fn new(endpoints: ProviderEndpoints, settings: FlowSettings) -> Self {
        let http = auth_http_client(settings.http_timeout);
        Self {
            flow: CodeFlow {
                provider: ProviderId::Anthropic,
                endpoints,
                scopes: SCOPES,
                callback_path: CALLBACK_PATH,
                extra_authorize_params: EXTRA_PARAMS,
                token_body: TokenBody::Json,
                settings,
                http,
            },
        }
    }
}

#[async_trait]
impl OAuthAdapter for AnthropicAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn authorize(&self) -> Result<AuthorizeOutcome, AuthError> {
        let tokens = self.flow.authorize_tokens().await?;
        let profile = match self.fetch_profile(&tokens).await {
            Ok(profile) => profile,
            Err(err) => {
                debug!(error = %err, "anthropic profile unavailable at link time");
                OAuthProfile::unknown(ProviderId::Anthropic)
            }
        };
        Ok(AuthorizeOutcome { tokens, profile })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthTokens, AuthError> {
        self.flow.refresh(refresh_token).await
    }

    fn lookahead_ms(&self) -> i64 {
        self.flow.settings.lookahead_ms
    }

    async fn fetch_profile(&self, tokens: &OAuthTokens) -> Result<OAuthProfile, AuthError> {
        let response = self
            .flow
            .http
            .get(&self.flow.endpoints.profile_url)
            .bearer_auth(&tokens.access_token)
            .header("anthropic-beta", OAUTH_BETA)
            .send()
            .await?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            return Err(AuthError::Status(code, response.text().await.unwrap_or_default()));
        }
        let body: Value = response.json().await?;
        profile_from_response(&body)
            .ok_or_else(|| AuthError::Invalid("profile response has no account id".to_string()))
    }
}

fn profile_from_response(body: &Value) -> Option<OAuthProfile> {
    let account = body.get("account").unwrap_or(body);
    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| account.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    };
    let id = pick(&["uuid", "id"])?;
    Some(OAuthProfile {
        id,
        email: pick(&["email_address", "email"]),
        name: pick(&["display_name", "full_name", "name"]),
        avatar: None,
    })
}
