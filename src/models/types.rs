//! Model provider configuration document and its views.

use crate::store::Document;
use crate::textutil::redact_secret;
use crate::types::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Where a provider's bearer credential comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CredentialSource {
    /// User-entered API key stored in the config.
    Manual,
    /// Resolved through the linked OAuth account at call time.
    OAuth(ProviderId),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::OAuth(provider) => write!(f, "oauth:{provider}"),
        }
    }
}

impl TryFrom<String> for CredentialSource {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CredentialSource> for String {
    fn from(value: CredentialSource) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for CredentialSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("manual") {
            return Ok(Self::Manual);
        }
        match s.split_once(':') {
            Some((kind, provider)) if kind.eq_ignore_ascii_case("oauth") => {
                Ok(Self::OAuth(provider.parse()?))
            }
            _ => Err(format!("unknown credential source `{s}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProviderConfig {
    pub provider: ProviderId,
    pub source: CredentialSource,
    /// Present only for manual sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched_at: Option<i64>,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

impl ModelProviderConfig {
    /// Copy suitable for the UI: manual tokens are masked.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.token = copy.token.as_deref().map(redact_secret);
        copy
    }

    pub fn is_stale(&self, now_ms: i64, staleness_ms: i64) -> bool {
        match self.last_fetched_at {
            Some(at) => now_ms.saturating_sub(at) > staleness_ms,
            None => true,
        }
    }
}

/// The `model-providers.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProvidersData {
    #[serde(default)]
    pub providers: Vec<ModelProviderConfig>,
}

impl ModelProvidersData {
    pub fn get(&self, provider: ProviderId) -> Option<&ModelProviderConfig> {
        self.providers.iter().find(|p| p.provider == provider)
    }

    pub fn get_mut(&mut self, provider: ProviderId) -> Option<&mut ModelProviderConfig> {
        self.providers.iter_mut().find(|p| p.provider == provider)
    }

    /// Insert or replace the entry for `config.provider`.
    pub fn upsert(&mut self, config: ModelProviderConfig) {
        match self.get_mut(config.provider) {
            Some(slot) => *slot = config,
            None => {
                self.providers.push(config);
                self.providers.sort_by_key(|p| p.provider);
            }
        }
    }
}

impl Document for ModelProvidersData {
    const FILE_NAME: &'static str = "model-providers.json";

    fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for entry in &self.providers {
            if !seen.insert(entry.provider) {
                return Err(format!("duplicate provider `{}`", entry.provider));
            }
            match entry.source {
                CredentialSource::Manual => {
                    if entry.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
                        return Err(format!("manual provider `{}` has no token", entry.provider));
                    }
                }
                CredentialSource::OAuth(linked) => {
                    if entry.token.is_some() {
                        return Err(format!(
                            "oauth provider `{}` must not store a token",
                            entry.provider
                        ));
                    }
                    if linked != entry.provider {
                        return Err(format!(
                            "provider `{}` cannot use `{}`",
                            entry.provider, entry.source
                        ));
                    }
                }
            }
            if entry.models.iter().any(|m| m.id.trim().is_empty()) {
                return Err(format!("provider `{}` lists a model without id", entry.provider));
            }
        }
        Ok(())
    }
}

/// One selectable model, as pushed with `models:changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnabledModel {
    pub provider: ProviderId,
    pub id: String,
    pub display_name: String,
    pub is_default: bool,
}

/// UI request for `models.providers.save`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProviderRequest {
    pub provider: ProviderId,
    pub source: CredentialSource,
    /// Omitted to keep the stored manual token.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    InvalidToken,
    NetworkError,
}

/// Outcome of `models.validate`; expected failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationFailure>,
}
