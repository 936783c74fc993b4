//! Per-session conversation memory.
//!
//! Sessions are keyed by `(session_id, memory_kind)`, so a buffer and a
//! summary memory with the same session id are independent. Each session
//! sits behind its own async mutex: a turn holds the lock from reading the
//! history until the exchange is recorded, which serializes concurrent
//! turns on one key while leaving other keys untouched. Clearing a session
//! waits for its in-flight turn and retires it, so a turn never writes into a
//! session that is no longer in the store.

use crate::summary::{self, Summarizer};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parley_ai::ModelHandle;
use parley_core::{ConfigurationError, HistoryEntry, Message};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// How a session retains history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Keep every message.
    #[default]
    Buffer,
    /// Fold old messages into a rolling summary.
    Summary,
}

impl MemoryKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = Report<ConfigurationError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buffer" => Ok(Self::Buffer),
            "summary" => Ok(Self::Summary),
            other => Err(ConfigurationError::UnknownMemoryKind {
                value: other.to_string(),
            }
            .into()),
        }
    }
}

/// Identifies one session's memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Caller-chosen session id.
    pub session_id: String,
    /// The memory kind.
    pub memory_kind: MemoryKind,
}

impl SessionKey {
    /// Creates a key.
    #[must_use]
    pub fn new(session_id: impl Into<String>, memory_kind: MemoryKind) -> Self {
        Self {
            session_id: session_id.into(),
            memory_kind,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.session_id, self.memory_kind)
    }
}

/// Retention policy of a session.
#[derive(Debug, Clone)]
pub enum MemoryPolicy {
    /// Unbounded history.
    Buffer,
    /// History bounded by `max_budget` tokens via rolling summaries.
    Summarizing {
        summarizer: Summarizer,
        max_budget: usize,
    },
}

/// One session's history.
#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    messages: Vec<Message>,
    policy: MemoryPolicy,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    retired: bool,
}

impl Session {
    /// Creates an empty session.
    #[must_use]
    pub fn new(key: SessionKey, policy: MemoryPolicy) -> Self {
        let now = Utc::now();
        Self {
            key,
            messages: Vec::new(),
            policy,
            created_at: now,
            updated_at: now,
            retired: false,
        }
    }

    /// Returns the session key.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Returns the stored messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the history as shown to readers.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages.iter().map(Message::to_history_entry).collect()
    }

    /// When the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When a turn was last recorded.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Appends one completed exchange, applying the retention policy.
    ///
    /// The new history is built aside and swapped in at the end, so a turn
    /// cancelled during summarization leaves the session unchanged.
    pub async fn record_turn(&mut self, user: Message, assistant: Message) {
        let mut next = self.messages.clone();
        next.push(user);
        next.push(assistant);

        if let MemoryPolicy::Summarizing {
            summarizer,
            max_budget,
        } = &self.policy
        {
            next = summary::compact(next, summarizer, *max_budget).await;
        }

        self.messages = next;
        self.updated_at = Utc::now();
    }
}

/// Shared handle to a session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Exclusive access to a live session, held for the duration of a turn.
pub type SessionGuard = OwnedMutexGuard<Session>;

/// All sessions of the process.
#[derive(Debug)]
pub struct SessionMemoryStore {
    sessions: DashMap<SessionKey, SessionHandle>,
    summary_budget: usize,
}

impl SessionMemoryStore {
    /// Creates an empty store; summary sessions are bounded by
    /// `summary_budget` tokens.
    #[must_use]
    pub fn new(summary_budget: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            summary_budget,
        }
    }

    /// Returns the session for `key`, creating it if needed.
    ///
    /// A new summary session summarizes with `model`; an existing session
    /// keeps the summarizer it was created with.
    #[must_use]
    pub fn get_or_create(&self, key: &SessionKey, model: &ModelHandle) -> SessionHandle {
        self.sessions
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(session = %key, "creating session");
                let policy = match key.memory_kind {
                    MemoryKind::Buffer => MemoryPolicy::Buffer,
                    MemoryKind::Summary => MemoryPolicy::Summarizing {
                        summarizer: Summarizer::new(model.clone()),
                        max_budget: self.summary_budget,
                    },
                };
                Arc::new(Mutex::new(Session::new(key.clone(), policy)))
            })
            .value()
            .clone()
    }

    /// Locks the live session for `key`, creating it if needed.
    ///
    /// Waits for any turn already running on the key. If the session was
    /// cleared while waiting, the lock is taken on its replacement instead.
    pub async fn acquire(&self, key: &SessionKey, model: &ModelHandle) -> SessionGuard {
        loop {
            let guard = self.get_or_create(key, model).lock_owned().await;
            if !guard.retired {
                return guard;
            }
        }
    }

    /// Returns the history of `key`; empty if the session does not exist.
    pub async fn history(&self, key: &SessionKey) -> Vec<HistoryEntry> {
        let Some(handle) = self.handle(key) else {
            return Vec::new();
        };
        let session = handle.lock().await;
        if session.retired {
            return Vec::new();
        }
        session.history()
    }

    /// Removes the session. Returns whether it existed.
    ///
    /// Waits for a turn in flight on the session, so that turn's exchange is
    /// recorded before the history is dropped.
    pub async fn clear(&self, key: &SessionKey) -> bool {
        let Some(handle) = self.handle(key) else {
            return false;
        };
        let mut session = handle.lock().await;
        if session.retired {
            return false;
        }

        session.retired = true;
        self.sessions
            .remove_if(key, |_, live| Arc::ptr_eq(live, &handle));
        debug!(session = %key, "cleared session");
        true
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns whether there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn handle(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.get(key).map(|entry| Arc::clone(entry.value()))
    }
}
