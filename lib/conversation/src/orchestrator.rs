//! Tool-calling orchestration.
//!
//! Runs the model/tool negotiation: the model replies either with text,
//! which ends the turn, or with tool calls, which are executed in order and
//! fed back as tool messages for the next round. Every turn ends after at
//! most `max_rounds` model calls.

use crate::error::ToolError;
use crate::tool::ToolRegistry;
use parley_ai::ModelHandle;
use parley_core::{ConfigurationError, Message, MessageRole};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// How a tool-assisted turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRunStatus {
    /// The model produced a final answer.
    Completed,
    /// The round cap was hit while the model still wanted tools.
    RoundLimitReached,
    /// A model call failed.
    ProviderFailed,
}

/// The outcome of one tool-assisted turn.
#[derive(Debug, Clone)]
pub struct ToolRun {
    /// The text to show the user.
    pub text: String,
    /// Every message of the turn, including the input.
    pub messages: Vec<Message>,
    /// Model calls made.
    pub rounds: usize,
    /// How the turn ended.
    pub status: ToolRunStatus,
}

impl ToolRun {
    /// Returns true unless the model produced a final answer.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.status != ToolRunStatus::Completed
    }
}

/// Drives the bounded model/tool loop.
#[derive(Debug, Clone)]
pub struct ToolCallingOrchestrator {
    tools: Arc<ToolRegistry>,
    max_rounds: usize,
}

impl ToolCallingOrchestrator {
    /// Creates an orchestrator over `tools` allowing `max_rounds` model
    /// calls per turn (at least one).
    #[must_use]
    pub fn new(tools: Arc<ToolRegistry>, max_rounds: usize) -> Self {
        Self {
            tools,
            max_rounds: max_rounds.max(1),
        }
    }

    /// Returns the round cap.
    #[must_use]
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Runs one turn starting from `messages`.
    ///
    /// With `selection`, only the named tools are declared and callable.
    /// Tool failures are reported to the model as tool messages; provider
    /// failures and the round cap end the turn with a degraded run.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTool` if the selection names an unregistered tool.
    #[instrument(
        name = "tool_run",
        skip(self, model, messages, selection),
        fields(model_id = %model.model_id(), max_rounds = self.max_rounds)
    )]
    pub async fn run(
        &self,
        model: &ModelHandle,
        mut messages: Vec<Message>,
        selection: Option<&[String]>,
    ) -> Result<ToolRun, Report<ConfigurationError>> {
        let schemas = self.tools.schemas(selection)?;
        let declared: Vec<String> = schemas.iter().map(|s| s.name.clone()).collect();
        let tools = (!schemas.is_empty()).then_some(schemas);

        let mut rounds = 0;
        loop {
            rounds += 1;
            let turn = match model.complete(messages.clone(), tools.clone()).await {
                Ok(turn) => turn,
                Err(e) => {
                    warn!(round = rounds, error = %e.current_context(), "model call failed");
                    return Ok(ToolRun {
                        text: format!("Conversation failed: {}", e.current_context()),
                        messages,
                        rounds,
                        status: ToolRunStatus::ProviderFailed,
                    });
                }
            };
            messages.push(turn.to_message());

            if !turn.requests_tools() {
                return Ok(ToolRun {
                    text: turn.text,
                    messages,
                    rounds,
                    status: ToolRunStatus::Completed,
                });
            }

            if rounds >= self.max_rounds {
                warn!(rounds, "tool round limit reached");
                let text = last_assistant_text(&messages).unwrap_or_else(|| {
                    format!(
                        "I could not reach a final answer within {} tool rounds.",
                        self.max_rounds
                    )
                });
                return Ok(ToolRun {
                    text,
                    messages,
                    rounds,
                    status: ToolRunStatus::RoundLimitReached,
                });
            }

            for call in &turn.tool_calls {
                let result = if declared.contains(&call.tool_name) {
                    self.tools.execute(call).await
                } else {
                    Err(ToolError::NotFound {
                        name: call.tool_name.clone(),
                    })
                };
                let content = match result {
                    Ok(output) => output,
                    Err(e) => format!("Error: {e}"),
                };
                debug!(round = rounds, tool = %call.tool_name, "tool result appended");
                messages.push(Message::tool(call.id.clone(), content));
            }
        }
    }
}

fn last_assistant_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant && !m.content.trim().is_empty())
        .map(|m| m.content.clone())
}
