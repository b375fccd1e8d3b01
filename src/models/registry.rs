//! Model provider registry: configured providers, their model lists, and
//! the credential each one presents to the model API.

use super::error::RegistryError;
use super::types::{
    CredentialSource, EnabledModel, ModelInfo, ModelProviderConfig, ModelProvidersData,
    SaveProviderRequest, TokenValidation, ValidationFailure,
};
use crate::api::{Credential, ModelTransport, RemoteModel};
use crate::auth::{LinkState, OAuthManager};
use crate::store::JsonDocument;
use crate::types::{now_millis, ProviderId};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

pub struct ModelRegistry {
    doc: JsonDocument<ModelProvidersData>,
    transport: Arc<dyn ModelTransport>,
    oauth: Arc<OAuthManager>,
    staleness_ms: i64,
    changed: broadcast::Sender<Vec<EnabledModel>>,
}

impl ModelRegistry {
    pub fn new(
        data_dir: &Path,
        transport: Arc<dyn ModelTransport>,
        oauth: Arc<OAuthManager>,
        staleness_ms: i64,
    ) -> Self {
        let (changed, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            doc: JsonDocument::in_dir(data_dir),
            transport,
            oauth,
            staleness_ms,
            changed,
        }
    }

    /// Receiver for `models:changed` payloads.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<EnabledModel>> {
        self.changed.subscribe()
    }

    /// Configured providers with masked tokens.
    ///
    /// With `auto_refresh`, enabled providers whose model list is older than
    /// the staleness threshold are re-fetched first. A failed re-fetch keeps
    /// the cached list.
    pub async fn load_providers(&self, auto_refresh: bool) -> Vec<ModelProviderConfig> {
        let mut data = self.doc.load().await;
        if auto_refresh {
            let now = now_millis();
            let stale: Vec<ModelProviderConfig> = data
                .providers
                .iter()
                .filter(|p| p.enabled && p.is_stale(now, self.staleness_ms))
                .cloned()
                .collect();
            let mut refreshed = Vec::new();
            for config in stale {
                match self.fetch_models(&config).await {
                    Ok(remote) => refreshed.push((config.provider, config.source, remote)),
                    Err(err) => {
                        warn!(provider = %config.provider, error = %err, "model list refresh failed")
                    }
                }
            }
            if !refreshed.is_empty() {
                let fetched_at = now_millis();
                let result = self
                    .doc
                    .update(|doc| {
                        for (provider, source, remote) in refreshed {
                            // Skip entries replaced while the fetch was on the wire.
                            if let Some(entry) = doc.get_mut(provider).filter(|e| e.source == source) {
                                entry.models = merge_models(&entry.models, remote);
                                entry.last_fetched_at = Some(fetched_at);
                            }
                        }
                        doc.clone()
                    })
                    .await;
                match result {
                    Ok(updated) => {
                        data = updated;
                        self.notify(&data);
                    }
                    Err(err) => warn!(error = %err, "failed to persist refreshed model lists"),
                }
            }
        }
        data.providers.iter().map(ModelProviderConfig::masked).collect()
    }

    /// Validate credentials, fetch the model list, and persist the provider.
    ///
    /// Returns the full catalog with masked tokens and emits `models:changed`.
    pub async fn save_provider(
        &self,
        request: SaveProviderRequest,
    ) -> Result<Vec<ModelProviderConfig>, RegistryError> {
        let provider = request.provider;
        let existing = self.doc.load().await.get(provider).cloned();
        let token = match request.source {
            CredentialSource::Manual => {
                let token = request
                    .token
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .or_else(|| {
                        existing
                            .as_ref()
                            .filter(|e| e.source == CredentialSource::Manual)
                            .and_then(|e| e.token.clone())
                    })
                    .ok_or(RegistryError::MissingToken(provider))?;
                Some(token)
            }
            CredentialSource::OAuth(linked) => {
                if linked != provider {
                    return Err(RegistryError::Invalid(format!(
                        "{provider} cannot use credentials from {linked}"
                    )));
                }
                if request.token.is_some() {
                    return Err(RegistryError::Invalid(
                        "oauth-backed providers do not take a token".to_string(),
                    ));
                }
                if self.oauth.linkage_state(linked).await == LinkState::Unlinked {
                    return Err(RegistryError::Auth(crate::auth::AuthError::NotLinked(linked)));
                }
                None
            }
        };

        let mut config = ModelProviderConfig {
            provider,
            source: request.source,
            token,
            enabled: request.enabled,
            last_fetched_at: None,
            models: existing
                .filter(|e| e.source == request.source)
                .map(|e| e.models)
                .unwrap_or_default(),
        };
        let remote = match self.fetch_models(&config).await {
            Ok(remote) => remote,
            Err(RegistryError::Api(err)) if err.is_auth_rejection() => {
                return Err(RegistryError::InvalidToken(provider));
            }
            Err(err) => return Err(err),
        };
        config.models = merge_models(&config.models, remote);
        config.last_fetched_at = Some(now_millis());

        let data = self
            .doc
            .update(|doc| {
                doc.upsert(config);
                doc.clone()
            })
            .await?;
        info!(%provider, source = %request.source, "model provider saved");
        self.notify(&data);
        Ok(data.providers.iter().map(ModelProviderConfig::masked).collect())
    }

    /// Live check of a manual token. Expected failures are reported in the
    /// result, never as errors.
    pub async fn validate_token(&self, provider: ProviderId, token: &str) -> TokenValidation {
        let token = token.trim();
        if token.is_empty() {
            return TokenValidation {
                valid: false,
                models: None,
                error: Some(ValidationFailure::InvalidToken),
            };
        }
        match self
            .transport
            .list_models(provider, &Credential::ApiKey(token.to_string()))
            .await
        {
            Ok(remote) => TokenValidation {
                valid: true,
                models: Some(merge_models(&[], remote)),
                error: None,
            },
            Err(err) => {
                debug!(%provider, error = %err, "token validation failed");
                let failure = if err.is_auth_rejection() {
                    ValidationFailure::InvalidToken
                } else {
                    ValidationFailure::NetworkError
                };
                TokenValidation {
                    valid: false,
                    models: None,
                    error: Some(failure),
                }
            }
        }
    }

    pub async fn toggle_model(
        &self,
        provider: ProviderId,
        model_id: &str,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        let data = self
            .doc
            .update(|doc| -> Result<ModelProvidersData, RegistryError> {
                let entry = doc
                    .get_mut(provider)
                    .ok_or(RegistryError::NotConfigured(provider))?;
                let model = entry
                    .models
                    .iter_mut()
                    .find(|m| m.id == model_id)
                    .ok_or_else(|| RegistryError::UnknownModel(model_id.to_string()))?;
                model.enabled = enabled;
                Ok(doc.clone())
            })
            .await??;
        self.notify(&data);
        Ok(())
    }

    /// Mark one model as the default, clearing the flag everywhere else.
    pub async fn set_default_model(
        &self,
        provider: ProviderId,
        model_id: &str,
    ) -> Result<(), RegistryError> {
        let data = self
            .doc
            .update(|doc| -> Result<ModelProvidersData, RegistryError> {
                let known = doc
                    .get(provider)
                    .ok_or(RegistryError::NotConfigured(provider))?
                    .models
                    .iter()
                    .any(|m| m.id == model_id);
                if !known {
                    return Err(RegistryError::UnknownModel(model_id.to_string()));
                }
                for entry in &mut doc.providers {
                    for model in &mut entry.models {
                        let chosen = entry.provider == provider && model.id == model_id;
                        model.is_default = chosen.then_some(true);
                    }
                }
                Ok(doc.clone())
            })
            .await??;
        self.notify(&data);
        Ok(())
    }

    /// Returns whether a configuration existed.
    pub async fn remove_provider(&self, provider: ProviderId) -> Result<bool, RegistryError> {
        let (removed, data) = self
            .doc
            .update(|doc| {
                let before = doc.providers.len();
                doc.providers.retain(|p| p.provider != provider);
                (doc.providers.len() != before, doc.clone())
            })
            .await?;
        if removed {
            info!(%provider, "model provider removed");
            self.notify(&data);
        }
        Ok(removed)
    }

    pub async fn enabled_models(&self) -> Vec<EnabledModel> {
        enabled_models(&self.doc.load().await)
    }

    /// Resolve a model id (or the default when `None`) to its provider.
    pub async fn resolve_model(
        &self,
        model: Option<&str>,
    ) -> Result<(ProviderId, String), RegistryError> {
        let models = self.enabled_models().await;
        let found = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(id) => models.into_iter().find(|m| m.id == id),
            None => {
                let fallback = models.first().cloned();
                models.into_iter().find(|m| m.is_default).or(fallback)
            }
        };
        found
            .map(|m| (m.provider, m.id))
            .ok_or_else(|| RegistryError::UnknownModel(model.unwrap_or("<default>").to_string()))
    }

    /// Effective credential for a configured provider. OAuth-backed
    /// providers refresh their token first if it is about to expire.
    pub async fn credential(&self, provider: ProviderId) -> Result<Credential, RegistryError> {
        let config = self
            .doc
            .load()
            .await
            .get(provider)
            .cloned()
            .ok_or(RegistryError::NotConfigured(provider))?;
        self.credential_for(&config).await
    }

    async fn credential_for(
        &self,
        config: &ModelProviderConfig,
    ) -> Result<Credential, RegistryError> {
        match config.source {
            CredentialSource::Manual => config
                .token
                .clone()
                .map(Credential::ApiKey)
                .ok_or(RegistryError::MissingToken(config.provider)),
            CredentialSource::OAuth(linked) => {
                Ok(Credential::OAuth(self.oauth.access_token(linked).await?))
            }
        }
    }

    async fn fetch_models(
        &self,
        config: &ModelProviderConfig,
    ) -> Result<Vec<RemoteModel>, RegistryError> {
        let credential = self.credential_for(config).await?;
        Ok(self.transport.list_models(config.provider, &credential).await?)
    }

    fn notify(&self, data: &ModelProvidersData) {
        // No receivers is fine.
        let _ = self.changed.send(enabled_models(data));
    }
}

/// Replace the model list, keeping per-model user choices for ids that
/// survive. New models start enabled.
fn merge_models(previous: &[ModelInfo], remote: Vec<RemoteModel>) -> Vec<ModelInfo> {
    remote
        .into_iter()
        .map(|model| {
            let prior = previous.iter().find(|p| p.id == model.id);
            ModelInfo {
                enabled: prior.map_or(true, |p| p.enabled),
                is_default: prior.and_then(|p| p.is_default),
                id: model.id,
                display_name: model.display_name,
                created_at: model.created_at,
            }
        })
        .collect()
}

fn enabled_models(data: &ModelProvidersData) -> Vec<EnabledModel> {
    data.providers
        .iter()
        .filter(|p| p.enabled)
        .flat_map(|p| {
            p.models.iter().filter(|m| m.enabled).map(|m| EnabledModel {
                provider: p.provider,
                id: m.id.clone(),
                display_name: m.display_name.clone(),
                is_default: m.is_default.unwrap_or(false),
            })
        })
        .collect()
}
