//! Conversation service.
//!
//! The facade the boundary layer talks to. It resolves models, picks the
//! chain for each entry point and owns the session store, so callers never
//! handle sessions or strategies directly.

use crate::chain::{self, ChainKind, ChainRequest, ChatResponse, TurnOutcome};
use crate::config::ConversationConfig;
use crate::factory::ChainFactory;
use crate::memory::{MemoryKind, SessionKey, SessionMemoryStore};
use crate::orchestrator::ToolCallingOrchestrator;
use crate::tool::ToolRegistry;
use parley_ai::{ModelHandle, ModelInfo, ModelRegistry};
use parley_core::{ConfigurationError, HistoryEntry, Message, TurnId};
use rootcause::Report;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Entry point for every conversation operation.
#[derive(Debug)]
pub struct ConversationService {
    models: ModelRegistry,
    tools: Arc<ToolRegistry>,
    memory: Arc<SessionMemoryStore>,
    chains: ChainFactory,
    orchestrator: ToolCallingOrchestrator,
    config: ConversationConfig,
}

impl ConversationService {
    /// Creates a service with the default chains.
    #[must_use]
    pub fn new(
        models: ModelRegistry,
        tools: Arc<ToolRegistry>,
        config: ConversationConfig,
    ) -> Self {
        let memory = Arc::new(SessionMemoryStore::new(config.summary_token_budget));
        let chains = ChainFactory::with_defaults(&config, memory.clone());
        let orchestrator = ToolCallingOrchestrator::new(tools.clone(), config.max_tool_rounds);

        Self {
            models,
            tools,
            memory,
            chains,
            orchestrator,
            config,
        }
    }

    /// Answers `message` without history.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if `model_id` is not in the catalog.
    #[instrument(
        skip(self, message),
        fields(turn_id = %TurnId::new(), message_len = message.len())
    )]
    pub async fn single_turn(
        &self,
        message: &str,
        model_id: Option<&str>,
    ) -> Result<ChatResponse, Report<ConfigurationError>> {
        let model = self.resolve(model_id)?;
        let chain = self.chains.get(ChainKind::Stateless)?;
        chain.invoke(&ChainRequest::new(message), &model).await
    }

    /// Answers `message` within the session `(session_id, kind)`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if `model_id` is not in the catalog.
    #[instrument(
        skip(self, message),
        fields(turn_id = %TurnId::new(), message_len = message.len())
    )]
    pub async fn memory_turn(
        &self,
        message: &str,
        model_id: Option<&str>,
        session_id: &str,
        kind: MemoryKind,
    ) -> Result<ChatResponse, Report<ConfigurationError>> {
        let model = self.resolve(model_id)?;
        let chain = self.chains.get(ChainKind::Memory)?;
        let request = ChainRequest::new(message).with_session(SessionKey::new(session_id, kind));
        chain.invoke(&request, &model).await
    }

    /// Answers `message` letting the model call tools.
    ///
    /// With `session`, the session history is replayed and a completed
    /// exchange is recorded; degraded runs are not. With `tool_names`,
    /// only those tools are offered.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` or `UnknownTool` for bad names.
    #[instrument(
        skip(self, message, session, tool_names),
        fields(
            turn_id = %TurnId::new(),
            message_len = message.len(),
            session = session.as_ref().map(tracing::field::display),
        )
    )]
    pub async fn tool_turn(
        &self,
        message: &str,
        model_id: Option<&str>,
        session: Option<SessionKey>,
        tool_names: Option<&[String]>,
    ) -> Result<ChatResponse, Report<ConfigurationError>> {
        let model = self.resolve(model_id)?;

        let Some(key) = session else {
            let messages = vec![
                Message::system(self.config.tool_persona.clone()),
                Message::user(message),
            ];
            let outcome = self.run_tools(&model, messages, tool_names).await?;
            return Ok(outcome.into_response(&model, None));
        };

        chain::session_turn(
            &self.memory,
            &key,
            &model,
            &self.config.tool_persona,
            message,
            |messages| self.run_tools(&model, messages, tool_names),
        )
        .await
    }

    /// Returns the history of a session; empty if it does not exist.
    pub async fn get_history(&self, session_id: &str, kind: MemoryKind) -> Vec<HistoryEntry> {
        self.memory
            .history(&SessionKey::new(session_id, kind))
            .await
    }

    /// Forgets a session. Returns whether it existed.
    ///
    /// A turn running on the session finishes and is recorded first.
    pub async fn clear_memory(&self, session_id: &str, kind: MemoryKind) -> bool {
        let cleared = self.memory.clear(&SessionKey::new(session_id, kind)).await;
        info!(session_id, %kind, cleared, "memory cleared");
        cleared
    }

    /// Returns every model, keyed by id.
    #[must_use]
    pub fn list_models(&self) -> BTreeMap<String, ModelInfo> {
        self.models.list_models()
    }

    /// Returns every tool's description, keyed by name.
    #[must_use]
    pub fn list_tools(&self) -> BTreeMap<String, String> {
        self.tools.list_tools()
    }

    /// Returns the chain kinds this service can run.
    #[must_use]
    pub fn available_chain_kinds(&self) -> Vec<ChainKind> {
        self.chains.available_kinds()
    }

    /// Returns the model used when callers do not name one.
    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Runs `fut` until it finishes or `token` is cancelled.
    ///
    /// Cancelling drops the turn: a session is only written once its
    /// exchange is complete, so a cancelled turn leaves no trace and
    /// releases its session.
    pub async fn cancellable<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = token.cancelled() => None,
            output = fut => Some(output),
        }
    }

    async fn run_tools(
        &self,
        model: &ModelHandle,
        messages: Vec<Message>,
        tool_names: Option<&[String]>,
    ) -> Result<TurnOutcome, Report<ConfigurationError>> {
        let run = self.orchestrator.run(model, messages, tool_names).await?;
        Ok(if run.is_degraded() {
            TurnOutcome::Failed(run.text)
        } else {
            TurnOutcome::Answered(run.text)
        })
    }

    fn resolve(&self, model_id: Option<&str>) -> Result<ModelHandle, Report<ConfigurationError>> {
        self.models
            .resolve(model_id.unwrap_or(&self.config.default_model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolDescriptor;
    use async_trait::async_trait;
    use parley_ai::{
        AssistantTurn, CompletionRequest, ModelCatalog, ModelConfig, ModelGateway, ProviderError,
        ScriptedGateway,
    };
    use parley_core::{MessageRole, ToolCallRequest};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn catalog() -> ModelCatalog {
        ModelCatalog::new()
            .with_model(ModelConfig::ollama("model-a", "test"))
            .with_model(ModelConfig::ollama("model-b", "test"))
    }

    fn config() -> ConversationConfig {
        ConversationConfig {
            default_model: "model-a".to_string(),
            ..ConversationConfig::default()
        }
    }

    fn service(gateway: Arc<dyn ModelGateway>) -> ConversationService {
        let tools = Arc::new(ToolRegistry::new());
        tools
            .register(
                ToolDescriptor::from_fn("calculator", "Evaluates arithmetic", |args| {
                    match args["expression"].as_str() {
                        Some("12*7") => Ok("84".to_string()),
                        _ => Ok("0".to_string()),
                    }
                })
                .with_parameter_schema(serde_json::json!({
                    "type": "object",
                    "properties": { "expression": { "type": "string" } },
                    "required": ["expression"]
                })),
            )
            .unwrap();
        ConversationService::new(ModelRegistry::new(catalog(), gateway), tools, config())
    }

    fn last_user_message(request: &CompletionRequest) -> String {
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// Answers arithmetic and recalls names from the transcript.
    fn echo_gateway() -> Arc<ScriptedGateway> {
        Arc::new(ScriptedGateway::responding(|request| {
            let question = last_user_message(request);
            if question == "What is 2+2?" {
                Ok(AssistantTurn::text("4"))
            } else if question == "What is my name?" {
                if request.mentions("My name is Ann") {
                    Ok(AssistantTurn::text("Your name is Ann."))
                } else {
                    Ok(AssistantTurn::text("I don't know your name."))
                }
            } else {
                Ok(AssistantTurn::text(format!("echo: {question}")))
            }
        }))
    }

    /// Never answers.
    struct StallingGateway;

    #[async_trait]
    impl ModelGateway for StallingGateway {
        async fn completion(
            &self,
            _request: &CompletionRequest,
        ) -> Result<AssistantTurn, Report<ProviderError>> {
            std::future::pending().await
        }

        fn provider(&self) -> &str {
            "stalling"
        }
    }

    /// Answers after a delay, recording how many messages each request had
    /// and how many requests overlapped.
    #[derive(Default)]
    struct SlowGateway {
        sizes: Mutex<Vec<usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ModelGateway for SlowGateway {
        async fn completion(
            &self,
            request: &CompletionRequest,
        ) -> Result<AssistantTurn, Report<ProviderError>> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.sizes.lock().unwrap().push(request.messages.len());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(AssistantTurn::text("ok"))
        }

        fn provider(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn single_turn_answers_without_memory() {
        let service = service(echo_gateway());

        let reply = service.single_turn("What is 2+2?", None).await.unwrap();

        assert_eq!(reply.text, "4");
        assert_eq!(reply.model_id, "model-a");
        assert!(!reply.memory_used);
        assert!(!reply.degraded);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let service = service(echo_gateway());

        let err = service
            .single_turn("hi", Some("gpt-9"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            ConfigurationError::UnknownModel { .. }
        ));
    }

    #[tokio::test]
    async fn memory_turn_remembers_the_user() {
        let service = service(echo_gateway());

        service
            .memory_turn("My name is Ann", None, "s1", MemoryKind::Buffer)
            .await
            .unwrap();
        let reply = service
            .memory_turn("What is my name?", None, "s1", MemoryKind::Buffer)
            .await
            .unwrap();

        assert!(reply.text.contains("Ann"));
        assert!(reply.memory_used);
        assert_eq!(reply.session_id.as_deref(), Some("s1"));

        // A different session knows nothing.
        let other = service
            .memory_turn("What is my name?", None, "s2", MemoryKind::Buffer)
            .await
            .unwrap();
        assert!(!other.text.contains("Ann"));
    }

    #[tokio::test]
    async fn history_holds_two_messages_per_turn() {
        let service = service(echo_gateway());

        for i in 0..4 {
            service
                .memory_turn(&format!("turn {i}"), Some("model-b"), "s1", MemoryKind::Buffer)
                .await
                .unwrap();
        }

        let history = service.get_history("s1", MemoryKind::Buffer).await;
        assert_eq!(history.len(), 8);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "turn 0");
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[7].content, "echo: turn 3");

        assert!(service.get_history("s1", MemoryKind::Summary).await.is_empty());
        assert!(service.get_history("nobody", MemoryKind::Buffer).await.is_empty());
    }

    #[tokio::test]
    async fn clear_memory_is_idempotent() {
        let service = service(echo_gateway());
        service
            .memory_turn("hello", None, "s1", MemoryKind::Summary)
            .await
            .unwrap();

        assert!(service.clear_memory("s1", MemoryKind::Summary).await);
        assert!(!service.clear_memory("s1", MemoryKind::Summary).await);
        assert!(service.get_history("s1", MemoryKind::Summary).await.is_empty());
    }

    #[tokio::test]
    async fn tool_turn_uses_the_calculator() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .with_turn(AssistantTurn::tool_calls(vec![ToolCallRequest::new(
                    "c1",
                    "calculator",
                    serde_json::json!({"expression": "12*7"}),
                )]))
                .with_turn(AssistantTurn::text("12*7 = 84")),
        );
        let service = service(gateway.clone());

        let reply = service
            .tool_turn("What is 12*7?", None, None, None)
            .await
            .unwrap();

        assert_eq!(reply.text, "12*7 = 84");
        assert!(!reply.degraded);
        assert!(gateway.requests()[1].mentions("84"));
    }

    #[tokio::test]
    async fn tool_turn_with_session_records_exchange() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .with_turn(AssistantTurn::text("hello"))
                .with_error(ProviderError::Timeout),
        );
        let service = service(gateway);
        let key = SessionKey::new("tools", MemoryKind::Buffer);

        let ok = service
            .tool_turn("hi", None, Some(key.clone()), None)
            .await
            .unwrap();
        assert!(ok.memory_used);

        let failed = service
            .tool_turn("again", None, Some(key), None)
            .await
            .unwrap();
        assert!(failed.degraded);

        assert_eq!(service.get_history("tools", MemoryKind::Buffer).await.len(), 2);
    }

    #[tokio::test]
    async fn tool_turn_rejects_unknown_tool_selection() {
        let service = service(echo_gateway());
        let selection = vec!["teleport".to_string()];

        let err = service
            .tool_turn("go", None, None, Some(selection.as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            ConfigurationError::UnknownTool { .. }
        ));
    }

    #[test]
    fn duplicate_tool_registration_is_rejected() {
        let service = service(echo_gateway());

        let err = service
            .tools()
            .register(ToolDescriptor::from_fn("calculator", "again", |_| {
                Ok(String::new())
            }))
            .unwrap_err();

        assert!(matches!(
            err.current_context(),
            ConfigurationError::DuplicateTool { .. }
        ));
    }

    #[test]
    fn listings_are_exposed() {
        let service = service(echo_gateway());

        assert_eq!(service.list_models().len(), 2);
        assert_eq!(service.list_tools()["calculator"], "Evaluates arithmetic");
        assert_eq!(service.default_model(), "model-a");
        assert_eq!(service.available_chain_kinds().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_turn_leaves_no_trace() {
        let service = Arc::new(service(Arc::new(StallingGateway)));
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            })
        };

        let outcome = ConversationService::cancellable(
            &token,
            service.memory_turn("hello", None, "s1", MemoryKind::Buffer),
        )
        .await;
        canceller.await.unwrap();

        assert!(outcome.is_none());

        // The session lock was released with the dropped turn.
        let history = tokio::time::timeout(
            Duration::from_secs(1),
            service.get_history("s1", MemoryKind::Buffer),
        )
        .await
        .expect("session lock released");
        assert!(history.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_turns_on_one_session_are_serialized() {
        let gateway = Arc::new(SlowGateway::default());
        let service = Arc::new(service(gateway.clone()));

        let turns: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|message| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .memory_turn(message, None, "shared", MemoryKind::Buffer)
                        .await
                        .unwrap()
                })
            })
            .collect();
        for turn in futures::future::join_all(turns).await {
            turn.unwrap();
        }

        // The second turn saw the first turn's exchange.
        let mut sizes = gateway.sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 4]);
        assert_eq!(service.get_history("shared", MemoryKind::Buffer).await.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn clear_during_a_turn_waits_for_it() {
        let gateway = Arc::new(SlowGateway::default());
        let service = Arc::new(service(gateway.clone()));
        let turn = |message: &'static str| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .memory_turn(message, None, "shared", MemoryKind::Buffer)
                    .await
                    .unwrap()
            })
        };

        let first = turn("A");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let clearing = {
            let service = service.clone();
            tokio::spawn(async move { service.clear_memory("shared", MemoryKind::Buffer).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = turn("B");

        assert!(!first.await.unwrap().degraded);
        assert!(clearing.await.unwrap());
        assert!(!second.await.unwrap().degraded);

        // One turn at a time on the key, and B started from an empty session.
        assert_eq!(gateway.peak.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.sizes.lock().unwrap().clone(), vec![2, 2]);
        let history = service.get_history("shared", MemoryKind::Buffer).await;
        let contents: Vec<_> = history.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["B", "ok"]);
    }
}
