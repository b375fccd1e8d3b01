//! Streaming transport to the model provider APIs.
//!
//! Each provider has its own wire module:
//! - `openai`: `/chat/completions` and `/models`
//! - `anthropic`: `/v1/messages` and `/v1/models`
//! - `sse`: shared event-stream framing
//!
//! Both normalize to [`StreamChunk`] so the chat loop never sees wire shapes.

use crate::config::ProvidersConfig;
use crate::error::ApiError;
use crate::types::{ChatRequest, ProviderId, ToolCall};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

mod anthropic;
mod openai;
mod sse;

/// One normalized unit of provider output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    TextDelta(String),
    /// A complete tool call; arguments are already assembled.
    ToolCall(ToolCall),
    /// Provider finished this response. `reason` is the provider's own label.
    Finished { reason: String },
}

pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ApiError>> + Send>>;

/// Effective credential for one call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    /// OAuth bearer access token.
    OAuth(String),
}

impl Credential {
    pub fn secret(&self) -> &str {
        match self {
            Self::ApiKey(s) | Self::OAuth(s) => s,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = crate::textutil::redact_secret(self.secret());
        match self {
            Self::ApiKey(_) => write!(f, "ApiKey({redacted})"),
            Self::OAuth(_) => write!(f, "OAuth({redacted})"),
        }
    }
}

/// Model entry as listed by a provider API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteModel {
    pub id: String,
    pub display_name: String,
    /// Epoch millis.
    pub created_at: Option<i64>,
}

/// Outbound model API boundary.
///
/// Tests substitute scripted transports; production uses [`HttpTransport`].
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn open_stream(
        &self,
        provider: ProviderId,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<ProviderStream, ApiError>;

    async fn list_models(
        &self,
        provider: ProviderId,
        credential: &Credential,
    ) -> Result<Vec<RemoteModel>, ApiError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http: reqwest::Client,
    providers: ProvidersConfig,
}

impl HttpTransport {
    /// `timeout` bounds connection setup; streaming bodies are read without a deadline.
    pub fn new(providers: ProvidersConfig, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(crate::build_info::user_agent())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, providers }
    }

    fn base_url(&self, provider: ProviderId) -> &str {
        self.providers.get(provider).base_url.trim_end_matches('/')
    }

    fn authorize(
        &self,
        provider: ProviderId,
        builder: reqwest::RequestBuilder,
        credential: &Credential,
    ) -> reqwest::RequestBuilder {
        match provider {
            ProviderId::OpenAi => builder.bearer_auth(credential.secret()),
            ProviderId::Anthropic => {
                let builder = builder.header("anthropic-version", anthropic::API_VERSION);
                match credential {
                    Credential::ApiKey(key) => builder.header("x-api-key", key),
                    Credential::OAuth(token) => builder
                        .bearer_auth(token)
                        .header("anthropic-beta", crate::auth::OAUTH_BETA),
                }
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status(status, body))
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn open_stream(
        &self,
        provider: ProviderId,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<ProviderStream, ApiError> {
        let (url, body) = match provider {
            ProviderId::OpenAi => (
                format!("{}/chat/completions", self.base_url(provider)),
                openai::request_body(request),
            ),
            ProviderId::Anthropic => (
                format!("{}/v1/messages", self.base_url(provider)),
                anthropic::request_body(request),
            ),
        };
        debug!(provider = %provider, model = %request.model, %url, "opening model stream");
        let builder = self
            .http
            .post(&url)
            .header("accept", "text/event-stream")
            .json(&body);
        let response = self.authorize(provider, builder, credential).send().await?;
        let response = check_status(response).await?;
        Ok(match provider {
            ProviderId::OpenAi => sse::decode_sse(response, openai::ChatCompletionsDecoder::default()),
            ProviderId::Anthropic => sse::decode_sse(response, anthropic::MessagesDecoder::default()),
        })
    }

    async fn list_models(
        &self,
        provider: ProviderId,
        credential: &Credential,
    ) -> Result<Vec<RemoteModel>, ApiError> {
        let url = match provider {
            ProviderId::OpenAi => format!("{}/models", self.base_url(provider)),
            ProviderId::Anthropic => format!("{}/v1/models?limit=1000", self.base_url(provider)),
        };
        let builder = self.http.get(&url);
        let response = self.authorize(provider, builder, credential).send().await?;
        let body: serde_json::Value = check_status(response).await?.json().await?;
        match provider {
            ProviderId::OpenAi => openai::parse_models(&body),
            ProviderId::Anthropic => anthropic::parse_models(&body),
        }
    }
}
