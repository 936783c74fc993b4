//! Tool registry.
//!
//! Tools are registered once at startup and read concurrently afterwards.
//! The registry keeps registration order so listings and the schemas
//! declared to the model are stable.

use crate::error::ToolError;
use async_trait::async_trait;
use parley_ai::ToolSchema;
use parley_core::{ConfigurationError, ToolCallRequest};
use rootcause::Report;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Trait for tool execution.
///
/// Executors are request/response functions; the registry does not
/// sandbox or rate-limit them.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Runs the tool with the model-supplied arguments.
    async fn run(&self, arguments: JsonValue) -> Result<String, ToolError>;
}

/// An executor backed by a synchronous function.
pub struct FnTool<F>(F);

impl<F> FnTool<F>
where
    F: Fn(JsonValue) -> Result<String, ToolError> + Send + Sync,
{
    /// Wraps `f` as an executor.
    #[must_use]
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ToolExecutor for FnTool<F>
where
    F: Fn(JsonValue) -> Result<String, ToolError> + Send + Sync,
{
    async fn run(&self, arguments: JsonValue) -> Result<String, ToolError> {
        (self.0)(arguments)
    }
}

/// A named tool: its schema and the function that runs it.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameter_schema: JsonValue,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolDescriptor {
    /// Creates a descriptor with an empty object schema.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        executor: impl ToolExecutor + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: serde_json::json!({"type": "object", "properties": {}}),
            executor: Arc::new(executor),
        }
    }

    /// Creates a descriptor backed by a synchronous function.
    #[must_use]
    pub fn from_fn<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(JsonValue) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self::new(name, description, FnTool::new(f))
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn with_parameter_schema(mut self, schema: JsonValue) -> Self {
        self.parameter_schema = schema;
        self
    }

    /// Returns the schema declared to the model.
    #[must_use]
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameter_schema.clone(),
        }
    }

    /// Runs the tool.
    ///
    /// # Errors
    ///
    /// Returns whatever the executor reports.
    pub async fn run(&self, arguments: JsonValue) -> Result<String, ToolError> {
        self.executor.run(arguments).await
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameter_schema", &self.parameter_schema)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    order: Vec<String>,
    tools: HashMap<String, ToolDescriptor>,
}

/// Registry of available tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTool` if a tool with the same name exists.
    pub fn register(&self, descriptor: ToolDescriptor) -> Result<(), Report<ConfigurationError>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.tools.contains_key(&descriptor.name) {
            return Err(ConfigurationError::DuplicateTool {
                name: descriptor.name,
            }
            .into());
        }

        debug!(tool = %descriptor.name, "registered tool");
        inner.order.push(descriptor.name.clone());
        inner.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Gets a tool by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no tool has this name.
    pub fn get(&self, name: &str) -> Result<ToolDescriptor, ToolError> {
        self.read()
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound {
                name: name.to_string(),
            })
    }

    /// Returns all tools in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<ToolDescriptor> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.tools.get(name).cloned())
            .collect()
    }

    /// Returns each tool's description, keyed by name.
    #[must_use]
    pub fn list_tools(&self) -> BTreeMap<String, String> {
        self.read()
            .tools
            .values()
            .map(|tool| (tool.name.clone(), tool.description.clone()))
            .collect()
    }

    /// Returns the schemas to declare to the model.
    ///
    /// With `selection`, only the named tools are declared, in the order
    /// given; otherwise every tool is, in registration order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTool` if the selection names an unregistered tool.
    pub fn schemas(
        &self,
        selection: Option<&[String]>,
    ) -> Result<Vec<ToolSchema>, Report<ConfigurationError>> {
        let Some(names) = selection else {
            return Ok(self.all().iter().map(ToolDescriptor::schema).collect());
        };

        let inner = self.read();
        names
            .iter()
            .map(|name| {
                inner.tools.get(name).map(ToolDescriptor::schema).ok_or_else(|| {
                    ConfigurationError::UnknownTool { name: name.clone() }.into()
                })
            })
            .collect()
    }

    /// Looks up and runs the tool a model asked for.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown tools, or the executor's error.
    pub async fn execute(&self, call: &ToolCallRequest) -> Result<String, ToolError> {
        let tool = self.get(&call.tool_name)?;

        let started = Instant::now();
        let result = tool.run(call.arguments.clone()).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => debug!(tool = %call.tool_name, latency_ms, "tool succeeded"),
            Err(e) => warn!(tool = %call.tool_name, latency_ms, error = %e, "tool failed"),
        }
        result
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::from_fn(name, format!("{name} tool"), |args| Ok(args.to_string()))
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool("calc")).expect("first registration");

        assert!(registry.get("calc").is_ok());

        let err = registry.register(echo_tool("calc")).unwrap_err();
        assert_eq!(
            err.current_context(),
            &ConfigurationError::DuplicateTool {
                name: "calc".to_string()
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.get("nope").unwrap_err(),
            ToolError::NotFound {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn all_preserves_registration_order() {
        let registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(echo_tool(name)).unwrap();
        }

        let names: Vec<_> = registry.all().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.list_tools()["alpha"], "alpha tool");
    }

    #[test]
    fn schemas_respect_selection() {
        let registry = ToolRegistry::new();
        registry
            .register(echo_tool("calculator").with_parameter_schema(serde_json::json!({
                "type": "object",
                "properties": { "expression": { "type": "string" } },
                "required": ["expression"]
            })))
            .unwrap();
        registry.register(echo_tool("get_weather")).unwrap();

        assert_eq!(registry.schemas(None).unwrap().len(), 2);

        let selected = registry
            .schemas(Some(&["calculator".to_string()]))
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].parameters["required"][0], "expression");

        let err = registry
            .schemas(Some(&["missing".to_string()]))
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConfigurationError::UnknownTool { .. }
        ));
    }

    #[tokio::test]
    async fn execute_runs_the_named_tool() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::from_fn("double", "doubles n", |args| {
                let n = args["n"]
                    .as_i64()
                    .ok_or_else(|| ToolError::invalid_arguments("double", "n must be an integer"))?;
                Ok((n * 2).to_string())
            }))
            .unwrap();

        let ok = ToolCallRequest::new("c1", "double", serde_json::json!({"n": 21}));
        assert_eq!(registry.execute(&ok).await.unwrap(), "42");

        let bad = ToolCallRequest::new("c2", "double", serde_json::json!({"n": "x"}));
        assert!(matches!(
            registry.execute(&bad).await,
            Err(ToolError::InvalidArguments { .. })
        ));

        let missing = ToolCallRequest::new("c3", "triple", serde_json::json!({}));
        assert!(matches!(
            registry.execute(&missing).await,
            Err(ToolError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_lookups_are_safe() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(echo_tool("echo")).unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let call = ToolCallRequest::new(format!("c{i}"), "echo", serde_json::json!(i));
                    registry.execute(&call).await
                })
            })
            .collect();

        for (i, task) in futures::future::join_all(tasks).await.into_iter().enumerate() {
            assert_eq!(task.unwrap().unwrap(), i.to_string());
        }
    }
}
