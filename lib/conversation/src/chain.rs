//! Chain strategies.
//!
//! A chain turns one user message into one reply. The stateless chain sends
//! only the persona and the message; the memory chain also replays the
//! session history and records the exchange afterwards.

use crate::memory::{MemoryKind, SessionKey, SessionMemoryStore};
use async_trait::async_trait;
use parley_ai::ModelHandle;
use parley_core::{ConfigurationError, Message};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// The kinds of chain a factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// No history.
    Stateless,
    /// Session history, read before and written after each turn.
    Memory,
}

impl ChainKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stateless => "stateless",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to a chain.
#[derive(Debug, Clone)]
pub struct ChainRequest {
    /// The user's message.
    pub message: String,
    /// The session, for chains that need one.
    pub session: Option<SessionKey>,
}

impl ChainRequest {
    /// A request without a session.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session: None,
        }
    }

    /// Binds the request to a session.
    #[must_use]
    pub fn with_session(mut self, session: SessionKey) -> Self {
        self.session = Some(session);
        self
    }
}

/// The reply to one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The reply text.
    pub text: String,
    /// The model that produced it.
    pub model_id: String,
    /// Whether session history was used.
    pub memory_used: bool,
    /// The session, when one was used.
    pub session_id: Option<String>,
    /// The memory kind, when a session was used.
    pub memory_kind: Option<MemoryKind>,
    /// True when the text describes a failure instead of an answer.
    #[serde(default)]
    pub degraded: bool,
}

impl ChatResponse {
    pub(crate) fn answer(
        text: impl Into<String>,
        model: &ModelHandle,
        session: Option<&SessionKey>,
    ) -> Self {
        Self {
            text: text.into(),
            model_id: model.model_id().to_string(),
            memory_used: session.is_some(),
            session_id: session.map(|key| key.session_id.clone()),
            memory_kind: session.map(|key| key.memory_kind),
            degraded: false,
        }
    }

    pub(crate) fn failure(
        text: impl Into<String>,
        model: &ModelHandle,
        session: Option<&SessionKey>,
    ) -> Self {
        Self {
            degraded: true,
            ..Self::answer(text, model, session)
        }
    }
}

/// How a model exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TurnOutcome {
    /// An answer worth remembering.
    Answered(String),
    /// A description of the failure; nothing is recorded.
    Failed(String),
}

impl TurnOutcome {
    pub(crate) fn into_response(
        self,
        model: &ModelHandle,
        session: Option<&SessionKey>,
    ) -> ChatResponse {
        match self {
            Self::Answered(text) => ChatResponse::answer(text, model, session),
            Self::Failed(text) => ChatResponse::failure(text, model, session),
        }
    }
}

/// Sends `messages` once, turning a provider failure into a failed outcome.
async fn complete(model: &ModelHandle, messages: Vec<Message>) -> TurnOutcome {
    match model.complete(messages, None).await {
        Ok(turn) => TurnOutcome::Answered(turn.text),
        Err(e) => {
            warn!(error = %e.current_context(), "model call failed");
            TurnOutcome::Failed(format!(
                "An error occurred while processing the request: {}",
                e.current_context()
            ))
        }
    }
}

/// Runs one turn inside the session `key`.
///
/// The session stays locked from reading its history until the exchange is
/// recorded. `exchange` receives persona, history and user message; only an
/// answered outcome is recorded.
pub(crate) async fn session_turn<F, Fut>(
    memory: &SessionMemoryStore,
    key: &SessionKey,
    model: &ModelHandle,
    persona: &str,
    message: &str,
    exchange: F,
) -> Result<ChatResponse, Report<ConfigurationError>>
where
    F: FnOnce(Vec<Message>) -> Fut,
    Fut: Future<Output = Result<TurnOutcome, Report<ConfigurationError>>>,
{
    let mut session = memory.acquire(key, model).await;

    let user = Message::user(message);
    let mut messages = Vec::with_capacity(session.messages().len() + 2);
    messages.push(Message::system(persona));
    messages.extend(session.messages().iter().cloned());
    messages.push(user.clone());

    let outcome = exchange(messages).await?;
    if let TurnOutcome::Answered(text) = &outcome {
        session
            .record_turn(user, Message::assistant(text.clone()))
            .await;
    } else {
        debug!(session = %key, "turn failed, not recorded");
    }
    Ok(outcome.into_response(model, Some(key)))
}

/// A way of answering one user message.
#[async_trait]
pub trait ChainStrategy: Send + Sync {
    /// The kind this strategy implements.
    fn kind(&self) -> ChainKind;

    /// Answers `request` with `model`.
    ///
    /// Provider failures are reported as degraded responses.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the request is unusable for this
    /// chain (e.g. no session for a memory chain).
    async fn invoke(
        &self,
        request: &ChainRequest,
        model: &ModelHandle,
    ) -> Result<ChatResponse, Report<ConfigurationError>>;
}

/// Persona plus user message; no history.
#[derive(Debug, Clone)]
pub struct StatelessChain {
    persona: String,
}

impl StatelessChain {
    /// Creates a stateless chain with the given persona.
    #[must_use]
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }
}

#[async_trait]
impl ChainStrategy for StatelessChain {
    fn kind(&self) -> ChainKind {
        ChainKind::Stateless
    }

    #[instrument(name = "stateless_chain", skip_all, fields(model_id = %model.model_id()))]
    async fn invoke(
        &self,
        request: &ChainRequest,
        model: &ModelHandle,
    ) -> Result<ChatResponse, Report<ConfigurationError>> {
        let messages = vec![
            Message::system(self.persona.clone()),
            Message::user(request.message.clone()),
        ];
        Ok(complete(model, messages).await.into_response(model, None))
    }
}

/// Persona, session history and user message; records the exchange.
#[derive(Debug, Clone)]
pub struct MemoryChain {
    persona: String,
    memory: Arc<SessionMemoryStore>,
}

impl MemoryChain {
    /// Creates a memory chain over `memory`.
    #[must_use]
    pub fn new(persona: impl Into<String>, memory: Arc<SessionMemoryStore>) -> Self {
        Self {
            persona: persona.into(),
            memory,
        }
    }
}

#[async_trait]
impl ChainStrategy for MemoryChain {
    fn kind(&self) -> ChainKind {
        ChainKind::Memory
    }

    #[instrument(
        name = "memory_chain",
        skip_all,
        fields(
            model_id = %model.model_id(),
            session = request.session.as_ref().map(tracing::field::display),
        )
    )]
    async fn invoke(
        &self,
        request: &ChainRequest,
        model: &ModelHandle,
    ) -> Result<ChatResponse, Report<ConfigurationError>> {
        let key = request
            .session
            .as_ref()
            .ok_or_else(|| ConfigurationError::MissingSession {
                chain: self.kind().to_string(),
            })?;

        session_turn(
            &self.memory,
            key,
            model,
            &self.persona,
            &request.message,
            |messages| async move {
                Ok::<_, Report<ConfigurationError>>(complete(model, messages).await)
            },
        )
        .await
    }
}
