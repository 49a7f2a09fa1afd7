//! Application State

use std::sync::Arc;

use zerogpt_core::{AgentConfig, HistoryStore, LlmProvider, Settings, ToolRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// LLM provider (OpenAI or a compatible server)
    pub provider: Arc<dyn LlmProvider>,

    /// Tool registry shared by every agent
    pub tools: Arc<ToolRegistry>,

    /// History for requests that carry a user id
    pub store: Arc<dyn HistoryStore>,

    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::from(self.settings.as_ref())
    }
}
