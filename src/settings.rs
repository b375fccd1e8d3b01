//! Generic application settings (`settings.json`).
//!
//! Only `agents` is interpreted here; any other keys the UI stores are kept
//! verbatim across load/save.

use crate::store::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// User-defined agent preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Tool allowlist; `None` allows every enabled tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

pub const BUILTIN_AGENT_ID: &str = "default";

impl Document for AppSettings {
    const FILE_NAME: &'static str = "settings.json";

    fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for agent in &self.agents {
            let id = agent.id.trim();
            if id.is_empty() {
                return Err("agent without an id".to_string());
            }
            if id == BUILTIN_AGENT_ID {
                return Err(format!("agent id `{BUILTIN_AGENT_ID}` is reserved"));
            }
            if !seen.insert(id) {
                return Err(format!("duplicate agent `{id}`"));
            }
        }
        Ok(())
    }
}
