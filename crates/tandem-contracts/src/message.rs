//! Conversation message types.
//!
//! Every message the orchestrator appends to a run's history is one of the
//! `Message` variants below. Participants never build role-tagged messages
//! themselves: they return a role-less `Draft`, and the orchestrator stamps
//! the sender role and the position in history.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of the conversation a message or tool call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    User,
}

impl Role {
    /// The role that speaks when this one hands the turn over.
    pub fn other(self) -> Role {
        match self {
            Role::Agent => Role::User,
            Role::User => Role::Agent,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_requestor() -> Role {
    Role::Agent
}

/// A single request to execute a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier; the matching `ToolMessage` carries the same id.
    pub id: String,
    /// Name of the action in the caller's toolkit.
    pub name: String,
    /// Argument object, validated against the tool's parameter schema.
    #[serde(default)]
    pub arguments: Value,
    /// The role that issued the call. Overwritten by the orchestrator.
    #[serde(default = "default_requestor")]
    pub requestor: Role,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            requestor: Role::Agent,
        }
    }

    /// Same call, issued by `role`.
    pub fn by(mut self, role: Role) -> Self {
        self.requestor = role;
        self
    }
}

/// What a participant hands back from `next_message`: text or tool calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Draft {
    /// A plain-text draft.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A draft consisting only of tool calls, in issue order.
    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    /// True when the draft carries non-blank text.
    pub fn has_text(&self) -> bool {
        has_text(&self.content)
    }

    pub fn is_tool_call(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Check the text-xor-tool-calls invariant.
    ///
    /// Returns a human-readable reason when the draft carries both or
    /// neither.
    pub fn check_format(&self) -> Result<(), String> {
        match (self.has_text(), self.is_tool_call()) {
            (true, false) | (false, true) => Ok(()),
            (true, true) => Err(
                "message carries both text and tool calls; send one or the other".to_string(),
            ),
            (false, false) => Err("message carries neither text nor tool calls".to_string()),
        }
    }
}

fn has_text(content: &Option<String>) -> bool {
    content.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// A text or tool-call message from the agent or the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Position of this message in the run's history.
    pub turn_idx: u64,
}

impl ChatMessage {
    /// Stamp a validated draft with its sender and history position.
    pub fn from_draft(draft: Draft, sender: Role, turn_idx: u64) -> Self {
        Self {
            content: draft.content,
            tool_calls: draft.tool_calls.into_iter().map(|c| c.by(sender)).collect(),
            turn_idx,
        }
    }

    pub fn has_text(&self) -> bool {
        has_text(&self.content)
    }

    pub fn is_tool_call(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The result of exactly one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    /// The id of the `ToolCall` this answers.
    pub id: String,
    /// The role whose call this answers.
    pub requestor: Role,
    /// Success payload, or `{"error": "..."}` when `error` is set.
    pub content: Value,
    #[serde(default)]
    pub error: bool,
    pub turn_idx: u64,
}

impl ToolMessage {
    /// An error result answering `call`.
    pub fn failed(call: &ToolCall, reason: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            requestor: call.requestor,
            content: serde_json::json!({ "error": reason.into() }),
            error: true,
            turn_idx: 0,
        }
    }
}

/// Ordered results answering every call of one multi-call message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiToolMessage {
    pub tool_messages: Vec<ToolMessage>,
    pub turn_idx: u64,
}

/// A notice from the runtime itself, e.g. a corrective protocol error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// The participant the notice is addressed to, if any.
    pub recipient: Option<Role>,
    pub content: String,
    pub turn_idx: u64,
}

/// One entry in a run's message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    Assistant(ChatMessage),
    User(ChatMessage),
    Tool(ToolMessage),
    MultiTool(MultiToolMessage),
    System(SystemMessage),
}

impl Message {
    /// The participant that sent a chat message, or whose calls a tool
    /// message answers. `None` for system notices and empty batches.
    pub fn role(&self) -> Option<Role> {
        match self {
            Message::Assistant(_) => Some(Role::Agent),
            Message::User(_) => Some(Role::User),
            Message::Tool(t) => Some(t.requestor),
            Message::MultiTool(m) => m.tool_messages.first().map(|t| t.requestor),
            Message::System(_) => None,
        }
    }

    /// Stable discriminant string used in logs and trace records.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Assistant(_) => "assistant",
            Message::User(_) => "user",
            Message::Tool(_) => "tool",
            Message::MultiTool(_) => "multi_tool",
            Message::System(_) => "system",
        }
    }

    pub fn turn_idx(&self) -> u64 {
        match self {
            Message::Assistant(m) | Message::User(m) => m.turn_idx,
            Message::Tool(t) => t.turn_idx,
            Message::MultiTool(m) => m.turn_idx,
            Message::System(s) => s.turn_idx,
        }
    }

    /// Chat payload for agent/user messages.
    pub fn chat(&self) -> Option<&ChatMessage> {
        match self {
            Message::Assistant(m) | Message::User(m) => Some(m),
            _ => None,
        }
    }

    /// Non-blank text of an agent/user message.
    pub fn text(&self) -> Option<&str> {
        self.chat()
            .filter(|m| m.has_text())
            .and_then(|m| m.content.as_deref())
    }

    /// Tool calls carried by an agent/user message; empty otherwise.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.chat().map(|m| m.tool_calls.as_slice()).unwrap_or(&[])
    }

    /// Tool results carried by a tool or multi-tool message; empty otherwise.
    pub fn tool_results(&self) -> &[ToolMessage] {
        match self {
            Message::Tool(t) => std::slice::from_ref(t),
            Message::MultiTool(m) => &m.tool_messages,
            _ => &[],
        }
    }

    /// Wrap tool results: a single result stays a `Tool` message.
    pub fn from_results(mut results: Vec<ToolMessage>, turn_idx: u64) -> Message {
        if results.len() == 1 {
            let mut only = results.remove(0);
            only.turn_idx = turn_idx;
            Message::Tool(only)
        } else {
            for r in &mut results {
                r.turn_idx = turn_idx;
            }
            Message::MultiTool(MultiToolMessage {
                tool_messages: results,
                turn_idx,
            })
        }
    }
}
