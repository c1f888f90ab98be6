//! Bounded agentic tool loop (§4.1, §4.7, §4.8), grounded on the teacher's
//! `tools/tool_loop.rs::run_tool_loop`: same round-bounded request/append
//! structure, generalized from the teacher's fixed `MAX_ITERATIONS = 25` and
//! Anthropic-content-block `raw_messages` to a caller-supplied round cap
//! (`kiwi_core::config::TOOL_LOOP_MAX_ROUNDS_CHAT`/`_EXTRACT`) and kiwi's own
//! [`ThreadMessage`] shape, plus client-tool suspension the teacher's agent
//! never needed (it had no notion of a tool requiring a paused turn).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kiwi_core::MessageRole;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::AiClient;
use crate::error::{AiError, Result};
use crate::port::ChatRequest;
use crate::types::{ChatOutcome, StreamEvent, ThreadMessage, ToolCall, ToolCallResult};

/// One tool handler, invoked with the model-supplied arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: serde_json::Value) -> ToolCallResult;
}

pub type ToolHandlers = HashMap<String, Arc<dyn ToolHandler>>;

/// Outcome of a bounded tool loop: either a final answer, or a pause on a
/// client-executed tool call (§4.7 `ask_clarifying_questions`) that the
/// caller must resolve before resuming.
#[derive(Debug, Clone)]
pub struct ToolLoopResult {
    pub outcome: ChatOutcome,
    /// The full thread including every round's tool call/result messages,
    /// ready for the caller to persist or resume from.
    pub thread: Vec<ThreadMessage>,
    pub suspended_on: Option<ToolCall>,
}

fn missing_handler_message(name: &str) -> String {
    format!("No handler for tool {name}; do not call again.")
}

fn record_tool_call(thread: &mut Vec<ThreadMessage>, content: &str, call: &ToolCall) {
    thread.push(ThreadMessage {
        role: MessageRole::AssistantToolCall,
        content: content.to_string(),
        tool_call_id: Some(call.id.clone()),
        tool_name: Some(call.name.clone()),
        tool_arguments: Some(call.input.clone()),
    });
}

fn record_tool_result(thread: &mut Vec<ThreadMessage>, name: &str, result: ToolCallResult) {
    thread.push(ThreadMessage {
        role: MessageRole::Tool,
        content: result.content,
        tool_call_id: Some(result.tool_call_id),
        tool_name: Some(name.to_string()),
        tool_arguments: None,
    });
}

async fn execute_tool(handlers: &ToolHandlers, call: &ToolCall) -> ToolCallResult {
    match handlers.get(&call.name) {
        Some(handler) => {
            let mut result = handler.call(call.input.clone()).await;
            result.tool_call_id = call.id.clone();
            result
        }
        None => ToolCallResult::error(call.id.clone(), missing_handler_message(&call.name)),
    }
}

/// Non-streaming bounded tool loop (§4.1 `ChatWithTools`).
pub async fn run_tool_loop(
    client: &AiClient,
    mut req: ChatRequest,
    handlers: &ToolHandlers,
    max_rounds: usize,
    suspend_on: &[String],
    cancel: &CancellationToken,
) -> Result<ToolLoopResult> {
    let mut thread = req.thread.clone();
    let mut last_outcome: Option<ChatOutcome> = None;

    for _round in 0..max_rounds {
        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }
        req.thread = thread.clone();
        let outcome = client.send_metered(req.clone(), cancel).await?;
        if !outcome.wants_tools() {
            return Ok(ToolLoopResult {
                outcome,
                thread,
                suspended_on: None,
            });
        }

        let mut suspended = None;
        for call in &outcome.tool_calls {
            record_tool_call(&mut thread, &outcome.content, call);
            if suspend_on.iter().any(|n| n == &call.name) {
                suspended = Some(call.clone());
                break;
            }
            let result = execute_tool(handlers, call).await;
            record_tool_result(&mut thread, &call.name, result);
        }
        if let Some(call) = suspended {
            return Ok(ToolLoopResult {
                outcome: outcome.clone(),
                thread,
                suspended_on: Some(call),
            });
        }
        last_outcome = Some(outcome);
    }

    last_outcome
        .map(|outcome| ToolLoopResult {
            outcome,
            thread,
            suspended_on: None,
        })
        .ok_or_else(|| AiError::Parse("tool loop exhausted with no model response".into()))
}

/// Streaming bounded tool loop (§4.1 `ChatStreamWithTools`). Emits the same
/// `Reasoning`/`Content`/`ToolCall`/`ToolResult` events per round as
/// [`crate::port::AiPort::send_stream`], plus one `ToolResult` event per
/// executed call so a client watching the stream sees the full round-trip.
#[allow(clippy::too_many_arguments)]
pub async fn run_tool_loop_stream(
    client: &AiClient,
    mut req: ChatRequest,
    handlers: &ToolHandlers,
    max_rounds: usize,
    suspend_on: &[String],
    cancel: &CancellationToken,
    tx: mpsc::Sender<StreamEvent>,
) -> Result<ToolLoopResult> {
    let mut thread = req.thread.clone();
    let mut last_outcome: Option<ChatOutcome> = None;

    for _round in 0..max_rounds {
        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }
        req.thread = thread.clone();
        let outcome = client
            .send_stream_metered(req.clone(), cancel, tx.clone())
            .await?;
        if !outcome.wants_tools() {
            return Ok(ToolLoopResult {
                outcome,
                thread,
                suspended_on: None,
            });
        }

        let mut suspended = None;
        for call in &outcome.tool_calls {
            record_tool_call(&mut thread, &outcome.content, call);
            if suspend_on.iter().any(|n| n == &call.name) {
                suspended = Some(call.clone());
                break;
            }
            let result = execute_tool(handlers, call).await;
            let _ = tx
                .send(StreamEvent::ToolResult {
                    id: result.tool_call_id.clone(),
                    name: call.name.clone(),
                    result: result.content.clone(),
                    is_error: result.is_error,
                })
                .await;
            record_tool_result(&mut thread, &call.name, result);
        }
        if let Some(call) = suspended {
            return Ok(ToolLoopResult {
                outcome: outcome.clone(),
                thread,
                suspended_on: Some(call),
            });
        }
        last_outcome = Some(outcome);
    }

    last_outcome
        .map(|outcome| ToolLoopResult {
            outcome,
            thread,
            suspended_on: None,
        })
        .ok_or_else(|| AiError::Parse("tool loop exhausted with no model response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_handler_message_matches_exact_wording() {
        assert_eq!(
            missing_handler_message("search_entities"),
            "No handler for tool search_entities; do not call again."
        );
    }
}
