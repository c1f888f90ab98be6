use kiwi_core::MessageRole;
use serde::{Deserialize, Serialize};

/// A single turn in a chat-shaped request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Reasoning-effort hint (§4.1, §6). `None` disables extended thinking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Thinking {
    Low,
    Medium,
    High,
}

/// Options shared by every C1 operation (§4.1). Per-op defaults for
/// `temperature` are applied by [`crate::client::AiClient`] when `None`.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub thinking: Option<Thinking>,
    pub system_prompts: Vec<String>,
}

/// Tool definition sent to the provider (§4.1, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call the model asked for in one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Result of executing one tool call, fed back into the next round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// One message in the raw conversational thread sent to a provider (§4.1,
/// §4.7). Reuses [`kiwi_core::MessageRole`] directly rather than a
/// provider-local enum, since the thread shape here is exactly what
/// `kiwi-chat` persists.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub role: MessageRole,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
    pub tool_arguments: Option<serde_json::Value>,
}

impl ThreadMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_arguments: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_arguments: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_arguments: None,
        }
    }
}

/// A completed chat turn, tool calls included when the model wants to act (§4.1).
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatOutcome {
    /// Whether the model's stop reason indicates it wants to call tools (§4.1).
    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty() && self.stop_reason == "tool_use"
    }
}

/// One event in a streamed response (§4.1). Ordering guarantee: all
/// `Reasoning` events for a round precede `Content`; `ToolCall` precedes its
/// `ToolResult`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Reasoning { delta: String },
    Content { delta: String },
    Step { name: String },
    ToolCall { id: String, name: String, arguments: serde_json::Value },
    ToolResult { id: String, name: String, result: String, is_error: bool },
    Done { model: String, tokens_in: u32, tokens_out: u32, stop_reason: String },
    Error { message: String },
}
