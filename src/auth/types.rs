//! Persisted OAuth records and the views handed to callers.

use crate::store::Document;
use crate::types::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Token bundle for one linked provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Epoch milliseconds. Tokens without an expiry never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl OAuthTokens {
    /// True when the token expires within `margin_ms` of `now_ms` (inclusive).
    pub fn is_expired_at(&self, now_ms: i64, margin_ms: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at.saturating_sub(now_ms) <= margin_ms,
            None => false,
        }
    }
}

/// Cached account details for a linked provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl OAuthProfile {
    /// Placeholder used when the profile endpoint is unreachable at link time.
    pub fn unknown(provider: ProviderId) -> Self {
        Self {
            id: format!("{provider}-account"),
            email: None,
            name: None,
            avatar: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthProviderData {
    pub tokens: OAuthTokens,
    pub profile: OAuthProfile,
    /// Epoch milliseconds of the authorize that created this link.
    pub connected_at: i64,
}

/// Primary signed-in account for the app session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub provider: ProviderId,
    pub user: OAuthProfile,
    pub signed_in_at: i64,
}

/// The credentials document (`credentials.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthStorageData {
    #[serde(default)]
    pub providers: BTreeMap<ProviderId, OAuthProviderData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<AuthSession>,
}

impl Document for OAuthStorageData {
    const FILE_NAME: &'static str = "credentials.json";

    fn validate(&self) -> Result<(), String> {
        for (provider, data) in &self.providers {
            if data.tokens.access_token.trim().is_empty() {
                return Err(format!("{provider}: empty access token"));
            }
            if data.profile.id.trim().is_empty() {
                return Err(format!("{provider}: empty profile id"));
            }
        }
        if let Some(session) = &self.session {
            if session.user.id.trim().is_empty() {
                return Err("session: empty user id".to_string());
            }
        }
        Ok(())
    }
}

/// Token validity as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Unlinked,
    Valid,
    Expired,
}

/// Token-free view of a linked provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedProvider {
    pub provider: ProviderId,
    pub profile: OAuthProfile,
    pub connected_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub state: LinkState,
}
