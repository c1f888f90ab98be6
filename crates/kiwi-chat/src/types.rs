use chrono::{DateTime, Utc};
use kiwi_core::domain::QueryMode as DomainQueryMode;
use serde::{Deserialize, Serialize};

/// Persisted conversation (§4.7, §3). `public_id` is the form callers and
/// frontends address it by; `id` never leaves this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub public_id: String,
    pub project_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted turn. `role`/`tool_execution` are stored as the raw string
/// forms of [`kiwi_core::domain::MessageRole`]/[`kiwi_core::domain::ToolExecution`]
/// rather than the enums themselves, matching how `kiwi-store` persists
/// `Project.state` (§3: enums are a construction-time/API-boundary
/// convenience, never round-tripped through the database as a type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
    pub tool_arguments: Option<serde_json::Value>,
    pub tool_execution: String,
    pub reasoning: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One query mode (§4.7): `fast` skips retrieval entirely, `normal` drives
/// hybrid retrieval + subgraph expansion, `agentic` runs the bounded C8
/// tool loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Fast,
    Normal,
    Agentic,
}

impl From<QueryMode> for DomainQueryMode {
    fn from(m: QueryMode) -> Self {
        match m {
            QueryMode::Fast => DomainQueryMode::Fast,
            QueryMode::Normal => DomainQueryMode::Normal,
            QueryMode::Agentic => DomainQueryMode::Agentic,
        }
    }
}

/// External query request (§6). `conversation_id` is a `public_id`; omitted
/// means "start a new conversation". `tool_id` resolves a pending
/// client-tool suspension (§4.7) and is otherwise absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub prompt: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub mode: QueryMode,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub think: Option<kiwi_ai::types::Thinking>,
    #[serde(default)]
    pub tool_id: Option<String>,
}

/// Streamed unit of a query response (§6). Mirrors [`kiwi_ai::types::StreamEvent`]
/// one-for-one for the pass-through variants, adding the chat-layer framing
/// (`conversation`, `citation`, `client_tool_call`) that only makes sense
/// once a thread is attached to a persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Conversation { id: String, title: String },
    Reasoning { delta: String },
    Content { delta: String },
    Citation { id: String, name: String, key: String },
    Step { name: String },
    Tool {
        call_id: String,
        name: String,
        arguments: Option<serde_json::Value>,
        result: Option<String>,
    },
    ClientToolCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    Metrics { tokens_in: u32, tokens_out: u32 },
    Done { stop_reason: String },
    Error { message: String },
}
