//! Model gateway abstraction.
//!
//! Provides a unified interface for model providers: send a list of
//! role-tagged messages, optionally declaring tools, and receive either a
//! final text completion or a list of requested tool invocations.

use crate::error::ProviderError;
use crate::model::ModelConfig;
use async_trait::async_trait;
use parley_core::{Message, ToolCallRequest};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument};

/// A tool as declared to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: JsonValue,
}

/// A request to a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Provider-side model name.
    pub model: String,
    /// The conversation so far, in order.
    pub messages: Vec<Message>,
    /// Tools the model may call. `None` disables tool calling.
    pub tools: Option<Vec<ToolSchema>>,
    /// Temperature for sampling.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Creates a request without tools.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Declares tools the model may call.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Returns true if any message content contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.content.contains(needle))
    }
}

/// One reply from the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// Generated text. May be empty when tools were requested.
    pub text: String,
    /// Tool invocations requested, in order.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantTurn {
    /// A plain text reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A reply requesting tool calls.
    #[must_use]
    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: String::new(),
            tool_calls,
        }
    }

    /// Returns true if the model asked for tools.
    #[must_use]
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Converts the reply into the assistant message that records it.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::assistant(self.text.clone()).with_tool_calls(self.tool_calls.clone())
    }
}

/// Trait for model providers.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Sends the request and returns the model's reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<AssistantTurn, Report<ProviderError>>;

    /// Returns the provider name, for logs.
    fn provider(&self) -> &str;
}

/// A resolved model: the gateway plus the model's configuration.
#[derive(Clone)]
pub struct ModelHandle {
    gateway: Arc<dyn ModelGateway>,
    config: ModelConfig,
}

impl ModelHandle {
    /// Creates a handle for `config` served by `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<dyn ModelGateway>, config: ModelConfig) -> Self {
        Self { gateway, config }
    }

    /// Returns the catalog id of the model.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.config.id
    }

    /// Returns the model configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Sends `messages` to the model, declaring `tools` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    #[instrument(
        name = "model_completion",
        skip(self, messages, tools),
        fields(
            model_id = %self.config.id,
            provider = self.gateway.provider(),
            message_count = messages.len(),
        )
    )]
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolSchema>>,
    ) -> Result<AssistantTurn, Report<ProviderError>> {
        let mut request = CompletionRequest::new(self.config.provider_model.clone(), messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);
        if let Some(tools) = tools {
            request = request.with_tools(tools);
        }

        let turn = self.gateway.completion(&request).await?;
        debug!(
            text_len = turn.text.len(),
            tool_calls = turn.tool_calls.len(),
            "model replied"
        );
        Ok(turn)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.gateway.provider())
            .field("config", &self.config)
            .finish()
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<AssistantTurn, ProviderError> + Send + Sync;

/// A gateway that replays scripted replies (for testing).
///
/// Queued replies are served first, in order; once the queue is empty the
/// responder (if any) computes the reply. Every request is recorded.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<AssistantTurn, ProviderError>>>,
    responder: Option<Box<Responder>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    /// Creates a gateway with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway that answers every request with `responder`.
    #[must_use]
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<AssistantTurn, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queues a reply.
    #[must_use]
    pub fn with_turn(self, turn: AssistantTurn) -> Self {
        self.lock_script().push_back(Ok(turn));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn with_error(self, error: ProviderError) -> Self {
        self.lock_script().push_back(Err(error));
        self
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_script(&self) -> MutexGuard<'_, VecDeque<Result<AssistantTurn, ProviderError>>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<AssistantTurn, Report<ProviderError>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let scripted = self.lock_script().pop_front();
        let reply = match (scripted, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(request),
            (None, None) => Err(ProviderError::RequestFailed {
                reason: "script exhausted".to_string(),
            }),
        };
        reply.map_err(Report::from)
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::MessageRole;

    fn handle(gateway: Arc<ScriptedGateway>) -> ModelHandle {
        ModelHandle::new(gateway, ModelConfig::ollama("model-a", "test model"))
    }

    #[test]
    fn completion_request_builder() {
        let request = CompletionRequest::new("qwen3:4b", vec![Message::user("hi")])
            .with_temperature(0.2)
            .with_max_tokens(64)
            .with_tools(vec![ToolSchema {
                name: "calc".to_string(),
                description: "math".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }]);

        assert_eq!(request.model, "qwen3:4b");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
        assert!(request.mentions("hi"));
    }

    #[test]
    fn assistant_turn_to_message_keeps_tool_calls() {
        let turn = AssistantTurn::tool_calls(vec![ToolCallRequest::new(
            "call_1",
            "calc",
            serde_json::json!({"expression": "1+1"}),
        )]);
        assert!(turn.requests_tools());

        let msg = turn.to_message();
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn scripted_gateway_serves_queue_then_responder() {
        let gateway = Arc::new(
            ScriptedGateway::responding(|_| Ok(AssistantTurn::text("fallback")))
                .with_turn(AssistantTurn::text("first")),
        );
        let model = handle(gateway.clone());

        let first = model.complete(vec![Message::user("a")], None).await.unwrap();
        let second = model.complete(vec![Message::user("b")], None).await.unwrap();

        assert_eq!(first.text, "first");
        assert_eq!(second.text, "fallback");
        assert_eq!(gateway.requests().len(), 2);
        assert!(gateway.requests()[1].mentions("b"));
    }

    #[tokio::test]
    async fn scripted_gateway_reports_errors() {
        let gateway = Arc::new(ScriptedGateway::new().with_error(ProviderError::Timeout));
        let model = handle(gateway);

        let err = model.complete(vec![], None).await.unwrap_err();
        assert_eq!(err.current_context(), &ProviderError::Timeout);

        let exhausted = model.complete(vec![], None).await.unwrap_err();
        assert!(matches!(
            exhausted.current_context(),
            ProviderError::RequestFailed { .. }
        ));
    }

    #[tokio::test]
    async fn handle_applies_model_settings() {
        let gateway = Arc::new(ScriptedGateway::new().with_turn(AssistantTurn::text("ok")));
        let model = handle(gateway.clone());

        model.complete(vec![Message::user("x")], None).await.unwrap();

        let request = &gateway.requests()[0];
        assert_eq!(request.model, "model-a");
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(2000));
        assert!(request.tools.is_none());
    }
}
