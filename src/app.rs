//! Service wiring from a loaded [`Config`].

use crate::api::{HttpTransport, ModelTransport};
use crate::auth::{adapters_from_config, BrowserLauncher, CredentialStore, OAuthManager};
use crate::bridge::Bridge;
use crate::chat::{ChatController, ChatDeps};
use crate::config::Config;
use crate::models::ModelRegistry;
use crate::store::JsonDocument;
use crate::tools::{ToolCatalog, ToolDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The long-lived backend services, shared by the bridge and the CLI.
pub struct Services {
    pub data_dir: PathBuf,
    pub oauth: Arc<OAuthManager>,
    pub registry: Arc<ModelRegistry>,
    pub bridge: Arc<Bridge>,
}

impl Services {
    /// Build production services. Must run inside a Tokio runtime.
    pub fn from_config(config: &Config, launcher: BrowserLauncher) -> Self {
        let data_dir = config.data_dir();
        debug!(data_dir = %data_dir.display(), "wiring services");

        let transport: Arc<dyn ModelTransport> = Arc::new(HttpTransport::new(
            config.providers.clone(),
            config.network.api_timeout(),
        ));
        let oauth = Arc::new(OAuthManager::new(
            CredentialStore::in_dir(&data_dir),
            adapters_from_config(config, launcher),
        ));
        let registry = Arc::new(ModelRegistry::new(
            &data_dir,
            Arc::clone(&transport),
            Arc::clone(&oauth),
            config.models.staleness_ms(),
        ));
        let catalog = Arc::new(ToolCatalog::new(&data_dir, &config.tools));
        let default_workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let chat = ChatController::new(ChatDeps {
            registry: Arc::clone(&registry),
            transport,
            catalog: Arc::clone(&catalog),
            dispatcher: ToolDispatcher::new(Duration::from_millis(config.tools.abort_grace_ms)),
            settings: JsonDocument::in_dir(&data_dir),
            config: config.chat.clone(),
            default_workspace,
        });
        let bridge = Arc::new(Bridge::new(
            Arc::clone(&oauth),
            Arc::clone(&registry),
            chat,
            catalog,
            JsonDocument::in_dir(&data_dir),
        ));

        Self {
            data_dir,
            oauth,
            registry,
            bridge,
        }
    }
}
