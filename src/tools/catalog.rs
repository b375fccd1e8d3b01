//! Merged tool catalog.
//!
//! Layers, lowest to highest: builtin tools, global command tools from
//! `<data_dir>/tools.json`, workspace command tools from
//! `<workspace>/.chatbridge/tools.json`. A later layer replaces an earlier
//! tool with the same name. `disabled` lists from both files hide tools from
//! the model.

use super::command::{CommandTool, CommandToolSpec};
use super::files::ReadFileTool;
use super::shell::ShellTool;
use super::time::CurrentTimeTool;
use super::Tool;
use crate::config::ToolsConfig;
use crate::error::{StoreError, ToolError};
use crate::store::{Document, JsonDocument};
use crate::types::ToolDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const WORKSPACE_DIR_NAME: &str = ".chatbridge";

/// Tool enablement and command tool declarations (`tools.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSettings {
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub tools: Vec<CommandToolSpec>,
}

impl Document for ToolSettings {
    const FILE_NAME: &'static str = "tools.json";

    fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for spec in &self.tools {
            if spec.name.trim().is_empty() {
                return Err("tool without a name".to_string());
            }
            if spec.command.trim().is_empty() {
                return Err(format!("tool `{}` has no command", spec.name));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(format!("duplicate tool `{}`", spec.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOrigin {
    Builtin,
    Global,
    Workspace,
}

/// Catalog entry as shown by `chat.getTools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub origin: ToolOrigin,
    pub enabled: bool,
}

pub struct ToolCatalog {
    builtins: Vec<Arc<dyn Tool>>,
    global: JsonDocument<ToolSettings>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ToolCatalog {
    /// Catalog with the standard builtin tools.
    pub fn new(data_dir: &Path, config: &ToolsConfig) -> Self {
        let timeout = Duration::from_secs(config.shell_timeout_secs.max(1));
        let builtins: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ShellTool {
                timeout,
                max_output_bytes: config.max_output_bytes,
            }),
            Arc::new(ReadFileTool {
                max_bytes: config.max_output_bytes,
            }),
            Arc::new(CurrentTimeTool),
        ];
        Self::with_builtins(data_dir, config, builtins)
    }

    pub fn with_builtins(
        data_dir: &Path,
        config: &ToolsConfig,
        builtins: Vec<Arc<dyn Tool>>,
    ) -> Self {
        Self {
            builtins,
            global: JsonDocument::in_dir(data_dir),
            timeout: Duration::from_secs(config.shell_timeout_secs.max(1)),
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub fn workspace_settings_path(workspace: &Path) -> PathBuf {
        workspace.join(WORKSPACE_DIR_NAME).join(ToolSettings::FILE_NAME)
    }

    /// Snapshot of the catalog as seen from `workspace`.
    pub async fn merged(&self, workspace: &Path) -> MergedCatalog {
        let global = self.global.load().await;
        let local = JsonDocument::<ToolSettings>::at(Self::workspace_settings_path(workspace))
            .load()
            .await;

        let mut entries: BTreeMap<String, CatalogEntry> = BTreeMap::new();
        for tool in &self.builtins {
            entries.insert(
                tool.name().to_string(),
                CatalogEntry {
                    tool: Arc::clone(tool),
                    origin: ToolOrigin::Builtin,
                    enabled: true,
                },
            );
        }
        for (settings, origin) in [(&global, ToolOrigin::Global), (&local, ToolOrigin::Workspace)] {
            for spec in &settings.tools {
                if let Some(previous) = entries.get(&spec.name) {
                    debug!(tool = %spec.name, from = ?previous.origin, to = ?origin, "tool overridden");
                }
                entries.insert(
                    spec.name.clone(),
                    CatalogEntry {
                        tool: Arc::new(CommandTool {
                            spec: spec.clone(),
                            timeout: self.timeout,
                            max_output_bytes: self.max_output_bytes,
                        }),
                        origin,
                        enabled: true,
                    },
                );
            }
        }
        let disabled: BTreeSet<&str> = global
            .disabled
            .iter()
            .chain(local.disabled.iter())
            .map(String::as_str)
            .collect();
        for (name, entry) in entries.iter_mut() {
            entry.enabled = !disabled.contains(name.as_str());
        }
        MergedCatalog { entries }
    }

    /// Flip a tool in the global `disabled` list.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
        self.global
            .update(|settings| {
                settings.disabled.retain(|n| n != name);
                if !enabled {
                    settings.disabled.push(name.to_string());
                    settings.disabled.sort();
                }
            })
            .await
    }
}

struct CatalogEntry {
    tool: Arc<dyn Tool>,
    origin: ToolOrigin,
    enabled: bool,
}

/// Immutable catalog view captured for one turn.
pub struct MergedCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl MergedCatalog {
    pub fn summaries(&self) -> Vec<ToolSummary> {
        self.entries
            .iter()
            .map(|(name, entry)| ToolSummary {
                name: name.clone(),
                description: entry.tool.definition().description,
                origin: entry.origin,
                enabled: entry.enabled,
            })
            .collect()
    }

    /// Definitions offered to the model: enabled tools, restricted to `allow`
    /// when the session sets an allowlist.
    pub fn definitions(&self, allow: Option<&[String]>) -> Vec<ToolDefinition> {
        self.entries
            .iter()
            .filter(|(name, entry)| entry.enabled && is_allowed(name, allow))
            .map(|(_, entry)| entry.tool.definition())
            .collect()
    }

    pub fn lookup(&self, name: &str, allow: Option<&[String]>) -> Result<Arc<dyn Tool>, ToolError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        if !entry.enabled || !is_allowed(name, allow) {
            return Err(ToolError::Disabled(name.to_string()));
        }
        Ok(Arc::clone(&entry.tool))
    }
}

fn is_allowed(name: &str, allow: Option<&[String]>) -> bool {
    allow.map_or(true, |names| names.iter().any(|n| n == name))
}
