//! Credential store: the `credentials.json` document plus per-provider helpers.
//!
//! Every helper is one load-modify-save critical section on the underlying
//! [`JsonDocument`], so a link for one provider never clobbers a concurrent
//! unlink of another.

use super::types::{AuthSession, OAuthProviderData, OAuthStorageData};
use crate::error::StoreError;
use crate::store::JsonDocument;
use crate::types::ProviderId;
use std::path::Path;

#[derive(Debug)]
pub struct CredentialStore {
    doc: JsonDocument<OAuthStorageData>,
}

impl CredentialStore {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            doc: JsonDocument::in_dir(data_dir),
        }
    }

    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    pub async fn load(&self) -> OAuthStorageData {
        self.doc.load().await
    }

    pub async fn save(&self, data: &OAuthStorageData) -> Result<(), StoreError> {
        self.doc.save(data).await
    }

    pub async fn get_provider(&self, provider: ProviderId) -> Option<OAuthProviderData> {
        self.load().await.providers.remove(&provider)
    }

    pub async fn save_provider(
        &self,
        provider: ProviderId,
        data: OAuthProviderData,
    ) -> Result<(), StoreError> {
        self.doc
            .update(|doc| {
                doc.providers.insert(provider, data);
            })
            .await
    }

    /// Remove a provider and any session it backs. Returns whether it existed.
    pub async fn remove_provider(&self, provider: ProviderId) -> Result<bool, StoreError> {
        self.doc
            .update(|doc| {
                if doc.session.as_ref().is_some_and(|s| s.provider == provider) {
                    doc.session = None;
                }
                doc.providers.remove(&provider).is_some()
            })
            .await
    }

    pub async fn set_session(&self, session: Option<AuthSession>) -> Result<(), StoreError> {
        self.doc.update(|doc| doc.session = session).await
    }

    /// Arbitrary read-modify-write under the document lock.
    pub(crate) async fn modify<R>(
        &self,
        f: impl FnOnce(&mut OAuthStorageData) -> R,
    ) -> Result<R, StoreError> {
        self.doc.update(f).await
    }
}
