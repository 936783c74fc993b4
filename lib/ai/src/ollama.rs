//! Ollama chat client.
//!
//! Talks to `POST {base_url}/api/chat` with streaming disabled. Ollama does
//! not assign ids to tool calls, so ids are generated here and carried on the
//! tool result messages for the orchestrator's bookkeeping.

use crate::backend::{AssistantTurn, CompletionRequest, ModelGateway, ToolSchema};
use crate::error::ProviderError;
use async_trait::async_trait;
use parley_core::{Message, ToolCallId, ToolCallRequest};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{instrument, warn};

/// Default address of a local Ollama server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Gateway backed by an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaGateway {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaGateway {
    /// Creates a gateway for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Report<ProviderError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable {
                provider: "ollama".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait]
impl ModelGateway for OllamaGateway {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<AssistantTurn, Report<ProviderError>> {
        let body = ChatRequestBody::from_request(request);

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else if e.is_connect() {
                    ProviderError::Unavailable {
                        provider: "ollama".to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    ProviderError::RequestFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "ollama rejected chat request");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let reply: ChatResponseBody =
            response
                .json()
                .await
                .map_err(|e| ProviderError::ResponseParseFailed {
                    reason: e.to_string(),
                })?;

        Ok(reply.into_turn())
    }

    fn provider(&self) -> &str {
        "ollama"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    stream: bool,
    options: WireOptions,
}

impl<'a> ChatRequestBody<'a> {
    fn from_request(request: &'a CompletionRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from_message).collect(),
            tools: request
                .tools
                .as_ref()
                .map(|tools| tools.iter().map(WireTool::from_schema).collect()),
            stream: false,
            options: WireOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

impl WireMessage {
    fn from_message(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    function: WireFunctionCall {
                        name: call.tool_name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: JsonValue,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

impl<'a> WireTool<'a> {
    fn from_schema(schema: &'a ToolSchema) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: &schema.name,
                description: &schema.description,
                parameters: &schema.parameters,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a JsonValue,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    message: WireMessage,
}

impl ChatResponseBody {
    fn into_turn(self) -> AssistantTurn {
        let tool_calls = self
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                ToolCallRequest::new(
                    ToolCallId::new().to_string(),
                    call.function.name,
                    call.function.arguments,
                )
            })
            .collect();

        AssistantTurn {
            text: self.message.content,
            tool_calls,
        }
    }
}
