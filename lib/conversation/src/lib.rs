//! Conversation service for parley.
//!
//! This crate provides:
//!
//! - **Tool Registry**: named tools the model may call mid-turn
//! - **Session Memory**: per-session history, buffered or summarizing
//! - **Chains**: the stateless and memory conversation strategies and the
//!   factory that caches one instance per kind
//! - **Orchestrator**: the bounded model/tool negotiation loop
//! - **Service**: the facade the boundary layer talks to

pub mod chain;
pub mod config;
pub mod error;
pub mod factory;
pub mod memory;
pub mod orchestrator;
pub mod service;
pub mod summary;
pub mod tool;

pub use chain::{
    ChainKind, ChainRequest, ChainStrategy, ChatResponse, MemoryChain, StatelessChain,
};
pub use config::ConversationConfig;
pub use error::ToolError;
pub use factory::ChainFactory;
pub use memory::{
    MemoryKind, MemoryPolicy, Session, SessionGuard, SessionHandle, SessionKey,
    SessionMemoryStore,
};
pub use orchestrator::{ToolCallingOrchestrator, ToolRun, ToolRunStatus};
pub use service::ConversationService;
pub use summary::Summarizer;
pub use tool::{FnTool, ToolDescriptor, ToolExecutor, ToolRegistry};
