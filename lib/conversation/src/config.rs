//! Conversation settings.

use serde::{Deserialize, Serialize};

/// Settings shared by every conversation entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Model used when a caller does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// System persona of the stateless chain.
    #[serde(default = "default_stateless_persona")]
    pub stateless_persona: String,
    /// System persona of the memory chain.
    #[serde(default = "default_memory_persona")]
    pub memory_persona: String,
    /// System persona of tool-assisted turns.
    #[serde(default = "default_tool_persona")]
    pub tool_persona: String,
    /// Maximum model calls in one tool-assisted turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Token budget of summary memories.
    #[serde(default = "default_summary_token_budget")]
    pub summary_token_budget: usize,
}

fn default_model() -> String {
    "qwen3:0.6b".to_string()
}

fn default_stateless_persona() -> String {
    "You are a helpful AI assistant. Answer the user's question accurately and helpfully."
        .to_string()
}

fn default_memory_persona() -> String {
    "You are a friendly AI assistant. You remember the conversation so far \
     and use it to give useful answers."
        .to_string()
}

fn default_tool_persona() -> String {
    "You are an AI assistant with access to tools. Use a tool when it helps \
     answer the question, then answer using its result."
        .to_string()
}

fn default_max_tool_rounds() -> usize {
    5
}

fn default_summary_token_budget() -> usize {
    1000
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            stateless_persona: default_stateless_persona(),
            memory_persona: default_memory_persona(),
            tool_persona: default_tool_persona(),
            max_tool_rounds: default_max_tool_rounds(),
            summary_token_budget: default_summary_token_budget(),
        }
    }
}
