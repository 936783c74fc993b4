//! HTTP routes.
//!
//! A thin JSON layer over [`ConversationService`]. Handlers only parse the
//! wire format and map results; a client disconnect drops the handler
//! future, which cancels the turn it was running.

use crate::error::ApiError;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post},
};
use chrono::Utc;
use parley_conversation::{ChatResponse, ConversationService, MemoryKind, SessionKey};
use parley_core::HistoryEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
pub type AppState = Arc<ConversationService>;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat/once", post(chat_once))
        .route("/chat/memory", post(chat_memory))
        .route("/chat/tool", post(chat_tool))
        .route("/chat/history/{chat_id}", get(chat_history))
        .route("/chat/memory/{chat_id}", delete(clear_memory))
        .route("/chat/models", get(list_models))
        .route("/chat/tools", get(list_tools))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of the chat endpoints.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    message: String,
    #[serde(default)]
    model_key: Option<String>,
    #[serde(default = "default_chat_id")]
    chat_id: String,
    #[serde(default = "default_memory_type")]
    memory_type: String,
    /// `/chat/tool` only: restrict the tools offered to the model.
    #[serde(default)]
    tools: Option<Vec<String>>,
    /// `/chat/tool` only: replay and record the session history.
    #[serde(default)]
    use_memory: bool,
}

fn default_chat_id() -> String {
    "default".to_string()
}

fn default_memory_type() -> String {
    MemoryKind::default().to_string()
}

/// Reply of the chat endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    response: String,
    model_used: String,
    has_memory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_type: Option<MemoryKind>,
    degraded: bool,
}

impl From<ChatResponse> for ChatReply {
    fn from(reply: ChatResponse) -> Self {
        Self {
            response: reply.text,
            model_used: reply.model_id,
            has_memory: reply.memory_used,
            chat_id: reply.session_id,
            memory_type: reply.memory_kind,
            degraded: reply.degraded,
        }
    }
}

/// Query of the history and clear endpoints.
#[derive(Debug, Deserialize)]
pub struct MemoryQuery {
    #[serde(default = "default_memory_type")]
    memory_type: String,
}

/// Reply of the history endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryReply {
    chat_id: String,
    memory_type: MemoryKind,
    history: Vec<HistoryEntry>,
    total_messages: usize,
}

/// Reply of the clear endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearReply {
    success: bool,
    message: String,
}

async fn root() -> Json<JsonValue> {
    Json(json!({
        "message": "parley chat service",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<JsonValue> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "services": {
            "conversation_service": "operational",
            "model_registry": "operational",
            "chain_factory": "operational",
        },
    }))
}

async fn chat_once(
    State(service): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let reply = service
        .single_turn(&request.message, request.model_key.as_deref())
        .await?;
    Ok(Json(reply.into()))
}

async fn chat_memory(
    State(service): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let kind: MemoryKind = request.memory_type.parse()?;
    let reply = service
        .memory_turn(
            &request.message,
            request.model_key.as_deref(),
            &request.chat_id,
            kind,
        )
        .await?;
    Ok(Json(reply.into()))
}

async fn chat_tool(
    State(service): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let session = if request.use_memory {
        let kind: MemoryKind = request.memory_type.parse()?;
        Some(SessionKey::new(request.chat_id.clone(), kind))
    } else {
        None
    };

    let reply = service
        .tool_turn(
            &request.message,
            request.model_key.as_deref(),
            session,
            request.tools.as_deref(),
        )
        .await?;
    Ok(Json(reply.into()))
}

async fn chat_history(
    State(service): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<HistoryReply>, ApiError> {
    let kind: MemoryKind = query.memory_type.parse()?;
    let history = service.get_history(&chat_id, kind).await;

    Ok(Json(HistoryReply {
        chat_id,
        memory_type: kind,
        total_messages: history.len(),
        history,
    }))
}

async fn clear_memory(
    State(service): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<ClearReply>, ApiError> {
    let kind: MemoryKind = query.memory_type.parse()?;
    let success = service.clear_memory(&chat_id, kind).await;

    let message = if success {
        format!("Cleared {kind} memory of session {chat_id}")
    } else {
        format!("No {kind} memory found for session {chat_id}")
    };
    Ok(Json(ClearReply { success, message }))
}

async fn list_models(State(service): State<AppState>) -> Json<JsonValue> {
    Json(json!({ "models": service.list_models() }))
}

async fn list_tools(State(service): State<AppState>) -> Json<JsonValue> {
    Json(json!({ "tools": service.list_tools() }))
}
