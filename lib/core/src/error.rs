//! Error handling foundation for parley.
//!
//! This module provides the `Result` type alias using rootcause and the
//! `ConfigurationError` taxonomy shared by every crate. Each crate defines
//! its own domain-specific errors in its own error module; configuration
//! errors live here because the model registry, the tool registry and the
//! chain factory all report them, and they are the only errors that abort a
//! call outright.

use rootcause::Report;
use std::fmt;

/// A Result type alias using rootcause's Report for error handling.
///
/// Each layer adds its own context via `.context()` as errors propagate.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

/// Structural misconfiguration. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The requested model id is not in the catalog.
    UnknownModel {
        model_id: String,
        available: Vec<String>,
    },
    /// No chain strategy is registered for the kind.
    UnknownChainKind { kind: String },
    /// A chain strategy is already registered for the kind.
    DuplicateChainKind { kind: String },
    /// A tool with this name is already registered.
    DuplicateTool { name: String },
    /// A tool selection named a tool that is not registered.
    UnknownTool { name: String },
    /// The memory kind string is neither `buffer` nor `summary`.
    UnknownMemoryKind { value: String },
    /// A session-bound chain was invoked without a session.
    MissingSession { chain: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownModel {
                model_id,
                available,
            } => {
                write!(
                    f,
                    "unknown model '{model_id}', available models: [{}]",
                    available.join(", ")
                )
            }
            Self::UnknownChainKind { kind } => {
                write!(f, "no chain registered for kind '{kind}'")
            }
            Self::DuplicateChainKind { kind } => {
                write!(f, "chain kind '{kind}' is already registered")
            }
            Self::DuplicateTool { name } => {
                write!(f, "tool '{name}' is already registered")
            }
            Self::UnknownTool { name } => write!(f, "unknown tool '{name}'"),
            Self::UnknownMemoryKind { value } => {
                write!(
                    f,
                    "unsupported memory kind '{value}', supported kinds: [buffer, summary]"
                )
            }
            Self::MissingSession { chain } => {
                write!(f, "chain '{chain}' requires a session")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }

    #[test]
    fn unknown_model_lists_available() {
        let err = ConfigurationError::UnknownModel {
            model_id: "gpt-x".to_string(),
            available: vec!["qwen3:0.6b".to_string(), "gemma3:4b".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("gpt-x"));
        assert!(text.contains("qwen3:0.6b, gemma3:4b"));
    }

    #[test]
    fn configuration_error_converts_into_report() {
        let result: Result<(), ConfigurationError> = Err(ConfigurationError::DuplicateTool {
            name: "calc".to_string(),
        }
        .into());
        let report = result.unwrap_err();
        assert_eq!(
            report.current_context(),
            &ConfigurationError::DuplicateTool {
                name: "calc".to_string()
            }
        );
    }
}
