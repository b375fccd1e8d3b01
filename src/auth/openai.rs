//! OpenAI identity adapter.
//!
//! Uses the public PKCE client with a fixed loopback redirect
//! (`http://localhost:1455/auth/callback`, the port registered for it). The
//! profile comes from the `id_token` claims when present, otherwise from the
//! userinfo endpoint.

use super::adapter::{auth_http_client, AuthorizeOutcome, CodeFlow, FlowSettings, OAuthAdapter, TokenBody};
use super::error::AuthError;
use super::types::{OAuthProfile, OAuthTokens};
use crate::config::ProviderEndpoints;
use crate::types::ProviderId;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use tracing::debug;

const SCOPES: &str = "openid profile email offline_access";
const CALLBACK_PATH: &str = "/auth/callback";
const EXTRA_PARAMS: &[(&str, &str)] = &[
    ("id_token_add_organizations", "true"),
    ("codex_cli_simplified_flow", "true"),
];

pub struct OpenAiAdapter {
    flow: CodeFlow,
}

impl OpenAiAdapter {
    pub fn new(endpoints: ProviderEndpoints, settings: FlowSettings) -> Self {
        let http = auth_http_client(settings.http_timeout);
        Self {
            flow: CodeFlow {
                provider: ProviderId::OpenAi,
                endpoints,
                scopes: SCOPES,
                callback_path: CALLBACK_PATH,
                extra_authorize_params: EXTRA_PARAMS,
                token_body: TokenBody::Form,
                settings,
                http,
            },
        }
    }

    async fn userinfo(&self, access_token: &str) -> Result<OAuthProfile, AuthError> {
        let response = self
            .flow
            .http
            .get(&self.flow.endpoints.profile_url)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            return Err(AuthError::Status(code, response.text().await.unwrap_or_default()));
        }
        let claims: Value = response.json().await?;
        profile_from_claims(&claims)
            .ok_or_else(|| AuthError::Invalid("userinfo response has no subject".to_string()))
    }
}

#[async_trait]
impl OAuthAdapter for OpenAiAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    async fn authorize(&self) -> Result<AuthorizeOutcome, AuthError> {
        let tokens = self.flow.authorize_tokens().await?;
        let profile = match self.fetch_profile(&tokens).await {
            Ok(profile) => profile,
            Err(err) => {
                debug!(error = %err, "openai profile unavailable at link time");
                OAuthProfile::unknown(ProviderId::OpenAi)
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
        if let Some(profile) = tokens
            .id_token
            .as_deref()
            .and_then(decode_jwt_claims)
            .as_ref()
            .and_then(profile_from_claims)
        {
            return Ok(profile);
        }
        self.userinfo(&tokens.access_token).await
    }
}

/// Decode the (unverified) payload segment of a JWT.
fn decode_jwt_claims(jwt: &str) -> Option<Value> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn profile_from_claims(claims: &Value) -> Option<OAuthProfile> {
    let id = claims.get("sub")?.as_str()?.trim();
    if id.is_empty() {
        return None;
    }
    let text = |key: &str| {
        claims
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    };
    Some(OAuthProfile {
        id: id.to_string(),
        email: text("email"),
        name: text("name"),
        avatar: text("picture"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::adapter::tests::{approving_launcher, stub_endpoints, test_settings};
    use crate::auth::browser::no_launcher;
    use crate::testsupport::{StubResponse, StubServer};
    use serde_json::json;

    fn fake_jwt(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn profile_decodes_from_id_token_claims() {
        let jwt = fake_jwt(json!({"sub": "user-9", "email": "u@example.com", "name": "U"}));
        let claims = decode_jwt_claims(&jwt).expect("claims");
        let profile = profile_from_claims(&claims).expect("profile");
        assert_eq!(profile.id, "user-9");
        assert_eq!(profile.email.as_deref(), Some("u@example.com"));
        assert_eq!(profile.avatar, None);
    }

    #[test]
    fn malformed_jwt_yields_none() {
        assert!(decode_jwt_claims("not-a-jwt").is_none());
        assert!(decode_jwt_claims("a.!!!.c").is_none());
    }

    #[tokio::test]
    async fn fetch_profile_falls_back_to_userinfo() {
        let server = StubServer::start(vec![(
            "/profile",
            StubResponse::json(200, json!({"sub": "from-userinfo"})),
        )])
        .await;
        let adapter = OpenAiAdapter::new(stub_endpoints(&server), test_settings(no_launcher()));
        let tokens = OAuthTokens {
            access_token: "at".into(),
            refresh_token: None,
            id_token: None,
            expires_at: None,
            scopes: None,
        };
        let profile = adapter.fetch_profile(&tokens).await.expect("profile");
        assert_eq!(profile.id, "from-userinfo");
        assert_eq!(
            server.requests()[0].header("authorization"),
            Some("Bearer at")
        );
    }

    #[tokio::test]
    async fn authorize_keeps_tokens_when_profile_unavailable() {
        // Verifies a failing profile endpoint does not abort linking.
        let server = StubServer::start(vec![
            (
                "/token",
                StubResponse::json(200, json!({"access_token": "at", "refresh_token": "rt"})),
            ),
            ("/profile", StubResponse::text(503, "down")),
        ])
        .await;
        let adapter =
            OpenAiAdapter::new(stub_endpoints(&server), test_settings(approving_launcher()));
        let outcome = adapter.authorize().await.expect("authorize");
        assert_eq!(outcome.tokens.access_token, "at");
        assert_eq!(outcome.profile, OAuthProfile::unknown(ProviderId::OpenAi));
    }
}
