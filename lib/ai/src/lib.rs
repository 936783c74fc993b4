//! Model access for parley.
//!
//! This crate provides:
//!
//! - **Gateway**: the `ModelGateway` capability that sends role-tagged
//!   messages (optionally declaring tools) and returns an `AssistantTurn`
//! - **Catalog**: the configured models and their display metadata
//! - **Registry**: resolves a model id to a callable `ModelHandle`
//! - **Ollama**: the HTTP client for a local Ollama server

pub mod backend;
pub mod error;
pub mod model;
pub mod ollama;

pub use backend::{
    AssistantTurn, CompletionRequest, ModelGateway, ModelHandle, ScriptedGateway, ToolSchema,
};
pub use error::ProviderError;
pub use model::{ModelCatalog, ModelConfig, ModelInfo, ModelProvider, ModelRegistry};
pub use ollama::OllamaGateway;
