//! Agent presets: the builtin default plus user agents from `settings.json`.

use crate::settings::{AgentDefinition, AppSettings, BUILTIN_AGENT_ID};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they help answer the user's request, and say so when a tool fails.";

pub fn builtin_agent() -> AgentDefinition {
    AgentDefinition {
        id: BUILTIN_AGENT_ID.to_string(),
        name: "Default".to_string(),
        description: "General-purpose assistant with every enabled tool.".to_string(),
        system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        tools: None,
    }
}

/// Builtin agent first, then user agents in stored order.
pub fn list_agents(settings: &AppSettings) -> Vec<AgentDefinition> {
    std::iter::once(builtin_agent())
        .chain(settings.agents.iter().cloned())
        .collect()
}

/// Unknown ids fall back to the builtin agent.
pub fn find_agent(settings: &AppSettings, id: Option<&str>) -> AgentDefinition {
    id.and_then(|id| settings.agents.iter().find(|a| a.id == id).cloned())
        .unwrap_or_else(builtin_agent)
}
