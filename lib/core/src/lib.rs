//! Core domain types and utilities for parley.
//!
//! This crate provides the message model shared by the model gateway and the
//! conversation layer, strongly-typed identifiers, and the error foundation
//! used throughout the workspace.

pub mod error;
pub mod id;
pub mod message;

pub use error::{ConfigurationError, Result};
pub use id::{ToolCallId, TurnId};
pub use message::{HistoryEntry, Message, MessageRole, ToolCallRequest};
