//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__` as
//! the nesting separator (e.g. `OLLAMA__BASE_URL`,
//! `CONVERSATION__MAX_TOOL_ROUNDS`).

use parley_conversation::ConversationConfig;
use serde::Deserialize;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Ollama connection settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Conversation settings.
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Ollama connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server.
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_ollama_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl OllamaConfig {
    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_ollama_base_url() -> String {
    parley_ai::ollama::DEFAULT_BASE_URL.to_string()
}

fn default_ollama_timeout_seconds() -> u64 {
    120
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            timeout_seconds: default_ollama_timeout_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_config_has_correct_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn empty_source_uses_defaults() {
        let config: ServerConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:8000");
        assert_eq!(config.conversation.max_tool_rounds, 5);
    }
}
