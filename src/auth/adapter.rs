//! Provider adapter capability and the shared authorization-code client.
//!
//! Each identity provider implements [`OAuthAdapter`]. The common PKCE
//! authorization-code mechanics (authorize URL, loopback redirect, token
//! endpoint calls) live in [`CodeFlow`], configured per provider.

use super::browser::BrowserLauncher;
use super::error::AuthError;
use super::pkce::{generate_state, CallbackListener, PkcePair};
use super::types::{OAuthProfile, OAuthTokens};
use crate::build_info;
use crate::config::ProviderEndpoints;
use crate::types::{now_millis, ProviderId};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Tokens plus the profile captured at link time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeOutcome {
    pub tokens: OAuthTokens,
    pub profile: OAuthProfile,
}

/// Capability every identity provider exposes.
#[async_trait]
pub trait OAuthAdapter: Send + Sync {
    fn provider(&self) -> ProviderId;

    /// Run the interactive authorization flow. Resolves only on success.
    async fn authorize(&self) -> Result<AuthorizeOutcome, AuthError>;

    /// Exchange a refresh token for a fresh token bundle.
    async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthTokens, AuthError>;

    /// Tokens expiring within this many milliseconds count as expired.
    fn lookahead_ms(&self) -> i64 {
        60_000
    }

    fn is_expired(&self, tokens: &OAuthTokens) -> bool {
        tokens.is_expired_at(now_millis(), self.lookahead_ms())
    }

    async fn fetch_profile(&self, tokens: &OAuthTokens) -> Result<OAuthProfile, AuthError>;
}

/// One adapter per provider, dispatched by [`ProviderId`].
#[derive(Clone)]
pub struct AdapterSet {
    openai: Arc<dyn OAuthAdapter>,
    anthropic: Arc<dyn OAuthAdapter>,
}

impl AdapterSet {
    pub fn new(openai: Arc<dyn OAuthAdapter>, anthropic: Arc<dyn OAuthAdapter>) -> Self {
        Self { openai, anthropic }
    }

    pub fn get(&self, provider: ProviderId) -> &Arc<dyn OAuthAdapter> {
        match provider {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
        }
    }
}

/// How the token endpoint expects its request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenBody {
    Form,
    Json,
}

/// Settings shared by every adapter built from config.
#[derive(Clone)]
pub struct FlowSettings {
    pub callback_timeout: Duration,
    pub lookahead_ms: i64,
    pub http_timeout: Duration,
    pub launcher: BrowserLauncher,
}

/// Authorization-code + PKCE client for one provider.
pub(crate) struct CodeFlow {
    pub provider: ProviderId,
    pub endpoints: ProviderEndpoints,
    pub scopes: &'static str,
    pub callback_path: &'static str,
    pub extra_authorize_params: &'static [(&'static str, &'static str)],
    pub token_body: TokenBody,
    pub settings: FlowSettings,
    pub http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_i64_option")]
    expires_in: Option<i64>,
    scope: Option<String>,
}

impl CodeFlow {
    /// Drive the browser flow and exchange the code for tokens.
    pub async fn authorize_tokens(&self) -> Result<OAuthTokens, AuthError> {
        let pkce = PkcePair::generate();
        let state = generate_state();
        let listener =
            CallbackListener::bind(self.endpoints.callback_port, self.callback_path).await?;
        let redirect_uri = listener.redirect_uri();
        let url = self.authorize_url(&redirect_uri, &pkce.challenge, &state)?;

        info!(provider = %self.provider, url = %url, "open this URL to authorize");
        if !(self.settings.launcher)(url.as_str()) {
            warn!(provider = %self.provider, "could not launch a browser; open the URL manually");
        }

        let code = listener
            .wait_for_code(&state, self.settings.callback_timeout)
            .await?;
        let mut body = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.endpoints.client_id.clone()),
            ("code_verifier", pkce.verifier),
        ];
        if self.token_body == TokenBody::Json {
            body.push(("state", state));
        }
        let response = self.post_token(&body).await.map_err(|err| match err {
            AuthError::Status(code, text) => {
                AuthError::AuthFailed(format!("token exchange rejected ({code}): {text}"))
            }
            other => other,
        })?;
        into_tokens(response, None)
    }

    /// Refresh, keeping `refresh_token` if the provider does not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens, AuthError> {
        let body = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.endpoints.client_id.clone()),
        ];
        let response = self.post_token(&body).await.map_err(|err| match err {
            AuthError::Status(code, text) => {
                AuthError::RefreshFailed(format!("refresh rejected ({code}): {text}"))
            }
            other => other,
        })?;
        into_tokens(response, Some(refresh_token))
    }

    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        challenge: &str,
        state: &str,
    ) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.endpoints.authorize_url).map_err(|err| {
            AuthError::Invalid(format!(
                "invalid authorize URL `{}`: {err}",
                self.endpoints.authorize_url
            ))
        })?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in self.extra_authorize_params {
                query.append_pair(key, value);
            }
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.endpoints.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", self.scopes)
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", "S256")
                .append_pair("state", state);
        }
        Ok(url)
    }

    async fn post_token(&self, body: &[(&str, String)]) -> Result<TokenResponse, AuthError> {
        let request = self.http.post(&self.endpoints.token_url);
        let request = match self.token_body {
            TokenBody::Form => request.form(body),
            TokenBody::Json => {
                let map: serde_json::Map<String, serde_json::Value> = body
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                request.json(&map)
            }
        };
        let response = request.send().await?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::Status(code, text));
        }
        Ok(response.json().await?)
    }
}

fn into_tokens(
    response: TokenResponse,
    previous_refresh: Option<&str>,
) -> Result<OAuthTokens, AuthError> {
    let access_token = response.access_token.unwrap_or_default().trim().to_string();
    if access_token.is_empty() {
        return Err(AuthError::Invalid(
            "token response did not include access_token".to_string(),
        ));
    }
    let refresh_token = response
        .refresh_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| previous_refresh.map(str::to_string));
    Ok(OAuthTokens {
        access_token,
        refresh_token,
        id_token: response.id_token.filter(|t| !t.trim().is_empty()),
        expires_at: response
            .expires_in
            .map(|secs| now_millis().saturating_add(secs.max(0).saturating_mul(1000))),
        scopes: response
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect()),
    })
}

/// Shared HTTP client for identity endpoints.
pub(crate) fn auth_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(build_info::user_agent())
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Accept `expires_in` as a number, numeric string or null.
fn deserialize_i64_option<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(num) => num
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("expires_in must be an integer"))
            .map(Some),
        serde_json::Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|err| serde::de::Error::custom(format!("invalid expires_in: {err}"))),
        _ => Err(serde::de::Error::custom(
            "expires_in must be string, number, or null",
        )),
    }
}
