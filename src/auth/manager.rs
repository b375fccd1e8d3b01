//! OAuth manager: per-provider link state machine over adapters and the store.
//!
//! ```text
//! Unlinked --link--> Linked(Valid) --time--> Linked(Expired)
//!    ^                    ^                        |
//!    |                    +-------refresh ok-------+
//!    +------unlink / refresh failure---------------+
//! ```

use super::adapter::AdapterSet;
use super::error::AuthError;
use super::store::CredentialStore;
use super::types::{AuthSession, LinkState, LinkedProvider, OAuthProfile, OAuthProviderData};
use crate::types::{now_millis, ProviderId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of [`OAuthManager::refresh_token_if_needed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    NotLinked,
    StillValid,
    Refreshed,
}

pub struct OAuthManager {
    store: CredentialStore,
    adapters: AdapterSet,
    /// Serializes refreshes per provider so concurrent callers share one.
    refresh_locks: [Mutex<()>; 2],
}

impl OAuthManager {
    pub fn new(store: CredentialStore, adapters: AdapterSet) -> Self {
        Self {
            store,
            adapters,
            refresh_locks: [Mutex::new(()), Mutex::new(())],
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Authorize with the provider and persist the resulting link.
    ///
    /// On failure nothing is written and the provider stays unlinked.
    pub async fn link_provider(&self, provider: ProviderId) -> Result<LinkedProvider, AuthError> {
        let adapter = self.adapters.get(provider);
        let outcome = adapter.authorize().await.map_err(|err| {
            warn!(%provider, error = %err, "authorization failed");
            match err {
                AuthError::AuthFailed(_) => err,
                other => AuthError::AuthFailed(other.to_string()),
            }
        })?;
        let data = OAuthProviderData {
            tokens: outcome.tokens,
            profile: outcome.profile,
            connected_at: now_millis(),
        };
        self.store.save_provider(provider, data.clone()).await?;
        info!(%provider, account = %data.profile.id, "provider linked");
        Ok(self.view(provider, &data))
    }

    /// Remove stored credentials. Unlinking an unlinked provider succeeds.
    pub async fn unlink_provider(&self, provider: ProviderId) -> Result<(), AuthError> {
        if self.store.remove_provider(provider).await? {
            info!(%provider, "provider unlinked");
        }
        Ok(())
    }

    /// Token-free view of every linked provider.
    pub async fn get_linked_providers(&self) -> Vec<LinkedProvider> {
        self.store
            .load()
            .await
            .providers
            .iter()
            .map(|(provider, data)| self.view(*provider, data))
            .collect()
    }

    pub async fn linkage_state(&self, provider: ProviderId) -> LinkState {
        match self.store.get_provider(provider).await {
            None => LinkState::Unlinked,
            Some(data) => self.view(provider, &data).state,
        }
    }

    /// Refresh the provider's tokens if they are inside the expiry window.
    ///
    /// Any refresh failure deletes the link: the user has to link again.
    pub async fn refresh_token_if_needed(
        &self,
        provider: ProviderId,
    ) -> Result<RefreshOutcome, AuthError> {
        let _flight = self.refresh_locks[provider.slot()].lock().await;
        let Some(current) = self.store.get_provider(provider).await else {
            return Ok(RefreshOutcome::NotLinked);
        };
        let adapter = self.adapters.get(provider);
        if !adapter.is_expired(&current.tokens) {
            return Ok(RefreshOutcome::StillValid);
        }

        debug!(%provider, "access token expired, refreshing");
        let refreshed = match current.tokens.refresh_token.as_deref() {
            Some(refresh_token) => adapter.refresh_token(refresh_token).await,
            None => Err(AuthError::RefreshFailed(
                "no refresh token stored".to_string(),
            )),
        };
        let tokens = match refreshed {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(%provider, error = %err, "refresh failed, removing link");
                self.drop_if_unchanged(provider, current.connected_at).await?;
                return Err(match err {
                    AuthError::RefreshFailed(_) => err,
                    other => AuthError::RefreshFailed(other.to_string()),
                });
            }
        };

        let profile = match adapter.fetch_profile(&tokens).await {
            Ok(profile) => profile,
            Err(err) => {
                debug!(%provider, error = %err, "profile refresh failed, keeping cached profile");
                current.profile.clone()
            }
        };
        let connected_at = current.connected_at;
        let updated = OAuthProviderData {
            tokens,
            profile,
            connected_at,
        };
        let applied = self
            .store
            .modify(|doc| match doc.providers.get_mut(&provider) {
                Some(entry) if entry.connected_at == connected_at => {
                    *entry = updated;
                    true
                }
                _ => false,
            })
            .await?;
        if !applied {
            // Unlinked or re-linked while the refresh was on the wire.
            debug!(%provider, "link changed during refresh, discarding result");
            return Ok(RefreshOutcome::NotLinked);
        }
        info!(%provider, "access token refreshed");
        Ok(RefreshOutcome::Refreshed)
    }

    /// Bearer token for model calls, refreshed first if needed.
    pub async fn access_token(&self, provider: ProviderId) -> Result<String, AuthError> {
        self.refresh_token_if_needed(provider).await?;
        self.store
            .get_provider(provider)
            .await
            .map(|data| data.tokens.access_token)
            .ok_or(AuthError::NotLinked(provider))
    }

    /// Sign in the app session with `provider`, linking it first if needed.
    pub async fn login(&self, provider: ProviderId) -> Result<AuthSession, AuthError> {
        let profile = match self.store.get_provider(provider).await {
            Some(data) => data.profile,
            None => self.link_provider(provider).await?.profile,
        };
        let session = AuthSession {
            provider,
            user: profile,
            signed_in_at: now_millis(),
        };
        self.store.set_session(Some(session.clone())).await?;
        info!(%provider, user = %session.user.id, "signed in");
        Ok(session)
    }

    pub async fn get_user(&self) -> Option<OAuthProfile> {
        self.store.load().await.session.map(|s| s.user)
    }

    /// End the app session. Provider links are kept.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.store.set_session(None).await?;
        Ok(())
    }

    async fn drop_if_unchanged(
        &self,
        provider: ProviderId,
        connected_at: i64,
    ) -> Result<(), AuthError> {
        self.store
            .modify(|doc| {
                if doc
                    .providers
                    .get(&provider)
                    .is_some_and(|entry| entry.connected_at == connected_at)
                {
                    doc.providers.remove(&provider);
                    if doc.session.as_ref().is_some_and(|s| s.provider == provider) {
                        doc.session = None;
                    }
                }
            })
            .await?;
        Ok(())
    }

    fn view(&self, provider: ProviderId, data: &OAuthProviderData) -> LinkedProvider {
        let state = if self.adapters.get(provider).is_expired(&data.tokens) {
            LinkState::Expired
        } else {
            LinkState::Valid
        };
        LinkedProvider {
            provider,
            profile: data.profile.clone(),
            connected_at: data.connected_at,
            expires_at: data.tokens.expires_at,
            state,
        }
    }
}
