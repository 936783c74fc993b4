//! Role-tagged messages exchanged with a model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
    /// System message (personas and memory summaries).
    System,
    /// Tool result message.
    Tool,
}

impl MessageRole {
    /// Returns the wire name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id chosen by the model; echoed back on the tool result.
    pub id: String,
    /// The tool name.
    pub tool_name: String,
    /// Structured arguments for the tool.
    pub arguments: JsonValue,
}

impl ToolCallRequest {
    /// Creates a new tool call request.
    #[must_use]
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// A message in a conversation.
///
/// Messages are values: once built they are only ever appended to a
/// sequence, never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
    /// The tool call this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls requested by the model (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a new message.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a tool result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Adds the tool calls the model requested alongside this message.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Returns true if this message has tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Strips tool metadata for display.
    #[must_use]
    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A message as shown to a history reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_creation() {
        let msg = Message::user("Hello!");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Hello!");
        assert!(msg.tool_call_id.is_none());
    }

    #[test]
    fn message_with_tool_calls() {
        let call = ToolCallRequest::new("call_1", "search", serde_json::json!({"query": "weather"}));
        let msg = Message::assistant("").with_tool_calls(vec![call]);

        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls[0].tool_name, "search");
    }

    #[test]
    fn tool_message_carries_call_id() {
        let msg = Message::tool("call_7", "42");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_7"));
    }

    #[test]
    fn history_entry_drops_tool_metadata() {
        let msg = Message::assistant("checking")
            .with_tool_calls(vec![ToolCallRequest::new("c", "calc", serde_json::json!({}))]);
        let entry = msg.to_history_entry();
        assert_eq!(entry.role, MessageRole::Assistant);
        assert_eq!(entry.content, "checking");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&MessageRole::Assistant).expect("serialize");
        assert_eq!(json, "\"assistant\"");
        assert_eq!(MessageRole::Tool.to_string(), "tool");
    }
}
