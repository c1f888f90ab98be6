//! Shared domain enums referenced by `kiwi-store`, `kiwi-extract`, `kiwi-merge`,
//! `kiwi-worker`, and `kiwi-chat` — kept in one place so the wire vocabulary
//! (status strings, role names) can't drift between crates.

use serde::{Deserialize, Serialize};

/// A project's lifecycle state (§3). Only one create/update/delete may be
/// in flight for a project at a time; the advisory lock enforces that, this
/// enum just records which kind of work is holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    Ready,
    Create,
    Update,
}

impl ProjectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectState::Ready => "ready",
            ProjectState::Create => "create",
            ProjectState::Update => "update",
        }
    }
}

/// `FACT` and `FILE` entity types are excluded from fuzzy/trigram merges (§3).
pub const ENTITY_TYPE_FACT: &str = "FACT";
pub const ENTITY_TYPE_FILE: &str = "FILE";

pub fn is_fuzzy_merge_excluded(entity_type: &str) -> bool {
    entity_type == ENTITY_TYPE_FACT || entity_type == ENTITY_TYPE_FILE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOperation {
    Index,
    Update,
}

impl BatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOperation::Index => "index",
            BatchOperation::Update => "update",
        }
    }
}

/// `BatchStatus.status` (§3). Transition order within one phase-success path:
/// `Pending -> Preprocessing -> Preprocessed -> Extracting -> Indexing -> Completed`.
/// `Failed` is reachable from any in-flight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatusKind {
    Pending,
    Preprocessing,
    Preprocessed,
    Extracting,
    Indexing,
    Completed,
    Failed,
}

impl BatchStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatusKind::Pending => "pending",
            BatchStatusKind::Preprocessing => "preprocessing",
            BatchStatusKind::Preprocessed => "preprocessed",
            BatchStatusKind::Extracting => "extracting",
            BatchStatusKind::Indexing => "indexing",
            BatchStatusKind::Completed => "completed",
            BatchStatusKind::Failed => "failed",
        }
    }

    /// Progress weight used by ETA/progress aggregation (§4.6): out of a
    /// nominal budget of `4 * total_batches`.
    pub fn progress_weight(&self) -> u32 {
        match self {
            BatchStatusKind::Pending => 0,
            BatchStatusKind::Preprocessing => 1,
            BatchStatusKind::Preprocessed => 1,
            BatchStatusKind::Extracting => 2,
            BatchStatusKind::Indexing => 3,
            BatchStatusKind::Completed => 4,
            BatchStatusKind::Failed => 0,
        }
    }

    /// The last-safe pending state a failed message is reset to for retry (§4.6).
    pub fn last_safe_state(&self) -> BatchStatusKind {
        match self {
            BatchStatusKind::Preprocessing => BatchStatusKind::Pending,
            BatchStatusKind::Extracting | BatchStatusKind::Indexing => {
                BatchStatusKind::Preprocessed
            }
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionJobStatusKind {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DescriptionJobStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptionJobStatusKind::Pending => "pending",
            DescriptionJobStatusKind::Processing => "processing",
            DescriptionJobStatusKind::Completed => "completed",
            DescriptionJobStatusKind::Failed => "failed",
        }
    }
}

/// `Stat.stat_type` (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    FileProcessing,
    GraphCreation,
    GraphUpdate,
}

impl StatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatType::FileProcessing => "file_processing",
            StatType::GraphCreation => "graph_creation",
            StatType::GraphUpdate => "graph_update",
        }
    }
}

/// Message role (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    AssistantToolCall,
    Tool,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::AssistantToolCall => "assistant_tool_call",
            MessageRole::Tool => "tool",
            MessageRole::System => "system",
        }
    }
}

/// Where a tool call executes (§3): empty string for non-tool messages in
/// the source model, `server` for C8 tools the engine resolves inline,
/// `client` for calls the frontend must answer (suspends the stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolExecution {
    Server,
    Client,
}

impl ToolExecution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolExecution::Server => "server",
            ToolExecution::Client => "client",
        }
    }
}

/// Query mode (§4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Fast,
    Normal,
    Agentic,
}

/// Reasoning effort hint passed through to C1 (§4.1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Thinking {
    Low,
    Medium,
    High,
}
