//! Error types for the AI crate.
//!
//! Errors are designed for layered context using rootcause. Model-id
//! problems are `parley_core::ConfigurationError`; everything that goes
//! wrong while talking to a provider is a `ProviderError`, which callers
//! absorb into a degraded response rather than propagate.

use std::fmt;

/// Errors from a model provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider is unreachable.
    Unavailable { provider: String, reason: String },
    /// Request failed before a response arrived.
    RequestFailed { reason: String },
    /// Response body could not be understood.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// Provider answered with a non-success status.
    Rejected { status: u16, body: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { provider, reason } => {
                write!(f, "model provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "model request failed: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse model response: {reason}")
            }
            Self::Timeout => write!(f, "model request timed out"),
            Self::Rejected { status, body } => {
                write!(f, "model provider rejected request ({status}): {body}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}
