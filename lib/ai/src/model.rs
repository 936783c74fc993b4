//! Model catalog and registry.
//!
//! The catalog lists the models a deployment offers; the registry pairs the
//! catalog with a gateway and turns a model id into a callable handle.

use crate::backend::{ModelGateway, ModelHandle};
use parley_core::ConfigurationError;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Available model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    /// Local Ollama instance.
    Ollama,
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// Configuration of one model in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Catalog id, as used by callers.
    pub id: String,
    /// Name shown to users.
    pub display_name: String,
    /// The provider serving the model.
    pub provider: ModelProvider,
    /// Model name on the provider side.
    pub provider_model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Whether the model may be used with session memory.
    pub supports_memory: bool,
    /// Short description (capabilities).
    pub description: String,
}

impl ModelConfig {
    /// Creates an Ollama-hosted model whose provider name equals its id.
    #[must_use]
    pub fn ollama(id: impl Into<String>, description: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            provider_model: id.clone(),
            id,
            provider: ModelProvider::Ollama,
            temperature: 0.7,
            max_tokens: 2000,
            supports_memory: true,
            description: description.into(),
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Returns the public description of this model.
    #[must_use]
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            display_name: self.display_name.clone(),
            provider: self.provider,
            description: self.description.clone(),
            supports_memory: self.supports_memory,
        }
    }
}

/// Public description of a model, as returned by `list_models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Name shown to users.
    pub display_name: String,
    /// The provider serving the model.
    pub provider: ModelProvider,
    /// Short description.
    pub description: String,
    /// Whether the model may be used with session memory.
    pub supports_memory: bool,
}

/// The set of models a deployment offers.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelConfig>,
}

impl ModelCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock catalog of locally hosted Ollama models.
    #[must_use]
    pub fn ollama_defaults() -> Self {
        Self::new()
            .with_model(ModelConfig::ollama("qwen3:0.6b", "tool, thinking, lightweight"))
            .with_model(ModelConfig::ollama("gemma3:4b", "no tool"))
            .with_model(ModelConfig::ollama("qwen3:4b", "tool, thinking"))
            .with_model(ModelConfig::ollama("qwen2.5:3b", "tool, thinking"))
    }

    /// Adds a model, replacing any model with the same id.
    #[must_use]
    pub fn with_model(mut self, config: ModelConfig) -> Self {
        self.models.insert(config.id.clone(), config);
        self
    }

    /// Looks up a model.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if the id is not in the catalog.
    pub fn get(&self, model_id: &str) -> Result<&ModelConfig, Report<ConfigurationError>> {
        self.models.get(model_id).ok_or_else(|| {
            ConfigurationError::UnknownModel {
                model_id: model_id.to_string(),
                available: self.ids(),
            }
            .into()
        })
    }

    /// Returns the ids of every model, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Returns the public description of every model, keyed by id.
    #[must_use]
    pub fn list(&self) -> BTreeMap<String, ModelInfo> {
        self.models
            .iter()
            .map(|(id, config)| (id.clone(), config.info()))
            .collect()
    }
}

/// Pairs the catalog with the gateway that serves it.
#[derive(Clone)]
pub struct ModelRegistry {
    catalog: ModelCatalog,
    gateway: Arc<dyn ModelGateway>,
}

impl ModelRegistry {
    /// Creates a registry serving `catalog` through `gateway`.
    #[must_use]
    pub fn new(catalog: ModelCatalog, gateway: Arc<dyn ModelGateway>) -> Self {
        Self { catalog, gateway }
    }

    /// Resolves a model id to a callable handle.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if the id is not in the catalog.
    pub fn resolve(&self, model_id: &str) -> Result<ModelHandle, Report<ConfigurationError>> {
        let config = self.catalog.get(model_id)?;
        Ok(ModelHandle::new(self.gateway.clone(), config.clone()))
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Returns the public description of every model, keyed by id.
    #[must_use]
    pub fn list_models(&self) -> BTreeMap<String, ModelInfo> {
        self.catalog.list()
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("catalog", &self.catalog)
            .field("provider", &self.gateway.provider())
            .finish()
    }
}
