use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of executing one graph tool, fed back to the model as the next
/// `tool` message (§4.8), mirroring the teacher's `tools::ToolResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// A single graph tool (§4.8). Each implementor is bound to one project at
/// construction time (the model never supplies `project_id` itself).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

pub(crate) fn required_str<'a>(input: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolResult> {
    match input.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ToolResult::error(format!("missing required parameter: {key}"))),
    }
}

pub(crate) fn optional_limit(input: &serde_json::Value, default: i64) -> i64 {
    input
        .get("limit")
        .and_then(|v| v.as_i64())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
