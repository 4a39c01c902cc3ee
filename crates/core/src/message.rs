//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the whole system:
//! advisor template → system message → gateway → tool results → reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// The resolved advisor instructions
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    /// Parse a role name case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content. `None` for assistant turns that only carry tool calls.
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls requested by the assistant, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// If this is a tool result, the tool that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (advisor primer annotations, provider info, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message carrying tool calls. Empty content is
    /// stored as `None`.
    pub fn assistant_tool_calls(
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content.filter(|c| !c.is_empty()));
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, Some(content.into()))
    }

    /// Create a message with an arbitrary role (used for advisor primers).
    pub fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self::with_role(role, Some(content.into()))
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg.tool_name = Some(tool_name.into());
        msg
    }

    /// The content as text, empty when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque ID correlating the request with its result
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as the raw JSON text the model produced
    pub arguments: String,
}

/// A broken link between tool calls and tool results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingViolation {
    #[error("tool message at {index} answers unknown or already resolved call '{tool_call_id}'")]
    Orphan { index: usize, tool_call_id: String },

    #[error("tool call '{tool_call_id}' is unresolved before message {index}")]
    Unresolved { index: usize, tool_call_id: String },
}

/// Check that every tool message answers exactly one pending request of the
/// nearest prior assistant message, and that every request is answered
/// before any other message follows.
pub fn check_tool_pairing(messages: &[Message]) -> Result<(), PairingViolation> {
    let mut pending: Vec<&str> = Vec::new();

    for (index, msg) in messages.iter().enumerate() {
        if msg.role == Role::Tool {
            let id = msg.tool_call_id.as_deref().unwrap_or("");
            match pending.iter().position(|p| *p == id) {
                Some(pos) => {
                    pending.remove(pos);
                }
                None => {
                    return Err(PairingViolation::Orphan {
                        index,
                        tool_call_id: id.to_string(),
                    });
                }
            }
            continue;
        }

        if let Some(first) = pending.first() {
            return Err(PairingViolation::Unresolved {
                index,
                tool_call_id: first.to_string(),
            });
        }

        if msg.role == Role::Assistant {
            pending = msg.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
        }
    }

    match pending.first() {
        Some(first) => Err(PairingViolation::Unresolved {
            index: messages.len(),
            tool_call_id: first.to_string(),
        }),
        None => Ok(()),
    }
}

/// A conversation is an ordered sequence of messages with shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        Self::with_id(ConversationId::new())
    }

    pub fn with_id(id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Render the history as `role: content` lines.
    pub fn transcript(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.text()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: "get_current_weather".into(),
            arguments: "{}".into(),
        }
    }

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, advisor!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, advisor!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn tool_only_assistant_has_no_content() {
        let msg = Message::assistant_tool_calls(Some(String::new()), vec![call("a")]);
        assert!(msg.content.is_none());
        assert_eq!(msg.text(), "");
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn tool_result_links_back() {
        let msg = Message::tool_result("call_1", "get_news", "{}");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.tool_name.as_deref(), Some("get_news"));
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::tool_result("call_9", "read_content", "body");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"tool""#));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("Assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse(" USER "), Some(Role::User));
        assert_eq!(Role::parse("narrator"), None);
    }

    #[test]
    fn pairing_accepts_resolved_rounds() {
        let msgs = vec![
            Message::system("s"),
            Message::user("u"),
            Message::assistant_tool_calls(None, vec![call("a"), call("b")]),
            Message::tool_result("a", "t", "1"),
            Message::tool_result("b", "t", "2"),
            Message::assistant("done"),
        ];
        assert_eq!(check_tool_pairing(&msgs), Ok(()));
    }

    #[test]
    fn pairing_rejects_orphan() {
        let msgs = vec![
            Message::user("u"),
            Message::assistant_tool_calls(None, vec![call("a")]),
            Message::tool_result("a", "t", "1"),
            Message::tool_result("a", "t", "again"),
        ];
        assert_eq!(
            check_tool_pairing(&msgs),
            Err(PairingViolation::Orphan {
                index: 3,
                tool_call_id: "a".into()
            })
        );
    }

    #[test]
    fn pairing_rejects_unresolved_before_next_turn() {
        let msgs = vec![
            Message::assistant_tool_calls(None, vec![call("a"), call("b")]),
            Message::tool_result("a", "t", "1"),
            Message::assistant("too early"),
        ];
        assert_eq!(
            check_tool_pairing(&msgs),
            Err(PairingViolation::Unresolved {
                index: 2,
                tool_call_id: "b".into()
            })
        );
    }

    #[test]
    fn pairing_rejects_trailing_unresolved() {
        let msgs = vec![Message::assistant_tool_calls(None, vec![call("a")])];
        assert!(matches!(
            check_tool_pairing(&msgs),
            Err(PairingViolation::Unresolved { index: 1, .. })
        ));
    }

    #[test]
    fn transcript_formats_roles() {
        let msgs = vec![Message::user("hi"), Message::assistant("hello")];
        assert_eq!(Conversation::transcript(&msgs), "user: hi\nassistant: hello");
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;
        conv.push(Message::user("First message"));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.updated_at >= created);
    }
}
