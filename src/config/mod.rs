//! Configuration loading from TOML files and environment variables.
//!
//! Precedence (highest wins):
//! 1. Environment variables (`CHATBRIDGE_DATA_DIR`,
//!    `CHATBRIDGE_OPENAI_BASE_URL`, `CHATBRIDGE_ANTHROPIC_BASE_URL`)
//! 2. TOML file given via `--config`
//! 3. `./chatbridge.toml`
//! 4. `$XDG_CONFIG_HOME/chatbridge/chatbridge.toml` (or `~/.config/...`)
//! 5. Built-in defaults

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

mod defaults;
mod types;

use defaults::{APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_CONFIG_TEMPLATE};
pub use types::{
    AuthConfig, ChatConfig, Config, ModelsConfig, NetworkConfig, PathsConfig, ProviderEndpoints,
    ProvidersConfig, ToolsConfig,
};

use crate::types::ProviderId;

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Local,
    Global(PathBuf),
    BuiltInDefaults,
}

/// Parsed config plus its origin.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from `--config`).
pub fn load_config(path_override: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&Path>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (text, source) = read_config_text(path_override, &read_file, &config_root)?;
    let mut config: Config = toml::from_str(&text)?;
    apply_env_overrides(&mut config, &env_lookup)?;
    if config.paths.data_dir.is_none() {
        config.paths.data_dir = config_root().map(|root| root.join(APP_DIR_NAME));
    }
    if config.paths.data_dir.is_none() {
        return Err(ConfigError::Invalid(
            "unable to resolve a data directory; set CHATBRIDGE_DATA_DIR".to_string(),
        ));
    }
    Ok(LoadedConfig { config, source })
}

fn read_config_text<FRead, FRoot>(
    path_override: Option<&Path>,
    read_file: &FRead,
    config_root: &FRoot,
) -> Result<(String, ConfigSource), ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FRoot: Fn() -> Option<PathBuf>,
{
    if let Some(path) = path_override {
        let text = read_file(path)?;
        return Ok((text, ConfigSource::Explicit(path.to_path_buf())));
    }
    if let Ok(text) = read_file(Path::new(CONFIG_FILE_NAME)) {
        return Ok((text, ConfigSource::Local));
    }
    if let Some(global) = default_global_config_path_with(config_root) {
        if let Ok(text) = read_file(&global) {
            return Ok((text, ConfigSource::Global(global)));
        }
    }
    Ok((String::new(), ConfigSource::BuiltInDefaults))
}

fn apply_env_overrides<FEnv>(config: &mut Config, env_lookup: &FEnv) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(dir) = non_empty_env(env_lookup, "CHATBRIDGE_DATA_DIR") {
        config.paths.data_dir = Some(PathBuf::from(dir));
    }
    for (provider, var) in [
        (ProviderId::OpenAi, "CHATBRIDGE_OPENAI_BASE_URL"),
        (ProviderId::Anthropic, "CHATBRIDGE_ANTHROPIC_BASE_URL"),
    ] {
        if let Some(url) = non_empty_env(env_lookup, var) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "invalid {var} value `{url}`: expected an http(s) URL"
                )));
            }
            config.providers.get_mut(provider).base_url = url;
        }
    }
    Ok(())
}

fn non_empty_env<FEnv>(env_lookup: &FEnv, name: &str) -> Option<String>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Default global config path (`~/.config/chatbridge/chatbridge.toml`).
pub fn default_global_config_path() -> Option<PathBuf> {
    default_global_config_path_with(&config_root_dir)
}

fn default_global_config_path_with<FRoot>(config_root: &FRoot) -> Option<PathBuf>
where
    FRoot: Fn() -> Option<PathBuf>,
{
    config_root().map(|root| root.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Write the commented default config to `path` unless one already exists.
///
/// Returns `false` when the file was already present.
pub fn write_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    Ok(true)
}

/// Config root: `$XDG_CONFIG_HOME`, else `~/.config`, else the platform dir.
pub fn config_root_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .or_else(dirs::config_dir)
}

impl Config {
    /// Resolved data directory. Always set after [`load_config`].
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(APP_DIR_NAME))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
