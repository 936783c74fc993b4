//! Error types for the conversation crate.
//!
//! Tool errors never fail a turn: the orchestrator renders them into tool
//! result messages so the model can react. Structural problems (unknown
//! model, duplicate registration, missing session) are
//! `parley_core::ConfigurationError` reports.

use std::fmt;

/// Errors from tool lookup and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool not found.
    NotFound { name: String },
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
    /// Tool arguments did not match the tool's schema.
    InvalidArguments { name: String, reason: String },
}

impl ToolError {
    /// Creates an execution failure for `name`.
    #[must_use]
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an argument validation failure for `name`.
    #[must_use]
    pub fn invalid_arguments(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "tool not found: {name}"),
            Self::ExecutionFailed { name, reason } => {
                write!(f, "tool '{name}' execution failed: {reason}")
            }
            Self::InvalidArguments { name, reason } => {
                write!(f, "invalid arguments for tool '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for ToolError {}
