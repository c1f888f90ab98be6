//! Drives one query end to end (§4.7): conversation lookup/creation, the
//! pending-client-tool resumption protocol, and per-mode dispatch to fast,
//! normal, or agentic generation. Streaming is relayed through a bounded
//! `mpsc` channel the same way [`kiwi_ai::client::AiClient::chat_stream`]
//! relays provider events, translating [`kiwi_ai::types::StreamEvent`] into
//! the richer [`crate::types::StreamFrame`] the frontend speaks.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kiwi_ai::types::{CallOptions, ChatMessage, StreamEvent, ThreadMessage, ToolDefinition};
use kiwi_ai::AiClient;
use kiwi_core::config::{ChatConfig, TOOL_LOOP_MAX_ROUNDS_CHAT};
use kiwi_core::domain::{MessageRole, ToolExecution};
use kiwi_store::GraphStore;
use kiwi_tools::{build_tool_handlers, build_tool_set};

use crate::citation::{CitationParser, ScanEvent};
use crate::context::build_context;
use crate::error::{ChatError, Result};
use crate::manager::{message_role_from_str, ConversationManager, NewMessage};
use crate::normalize::normalize;
use crate::types::{Conversation, Message, QueryMode, QueryRequest, StreamFrame};

const ASK_CLARIFYING_QUESTIONS: &str = "ask_clarifying_questions";

#[derive(Deserialize)]
struct FastAnswer {
    answer: String,
}

pub struct ChatEngine {
    store: Arc<GraphStore>,
    ai: Arc<AiClient>,
    conversations: Arc<ConversationManager>,
    chat_config: ChatConfig,
    enable_query_clarification: bool,
}

impl ChatEngine {
    pub fn new(
        store: Arc<GraphStore>,
        ai: Arc<AiClient>,
        conversations: Arc<ConversationManager>,
        chat_config: ChatConfig,
        enable_query_clarification: bool,
    ) -> Self {
        Self {
            store,
            ai,
            conversations,
            chat_config,
            enable_query_clarification,
        }
    }

    /// Drives one query (§4.7), streaming frames through `tx`. Cancellation
    /// mid-turn surfaces as `StreamFrame::Error` and no assistant message is
    /// persisted (§5, §7).
    #[tracing::instrument(skip(self, req, tx, cancel), fields(project_id, mode = ?req.mode))]
    pub async fn query_stream(
        &self,
        project_id: i64,
        req: QueryRequest,
        tx: mpsc::Sender<StreamFrame>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let conversation = self
            .conversations
            .get_or_create_conversation(
                project_id,
                req.conversation_id.as_deref(),
                &req.prompt,
                self.chat_config.title_chars,
            )
            .await?;
        let _ = tx
            .send(StreamFrame::Conversation {
                id: conversation.public_id.clone(),
                title: conversation.title.clone(),
            })
            .await;

        self.resolve_pending_tool(&conversation, &req).await?;

        let opts = CallOptions {
            model: req.model.clone(),
            temperature: None,
            thinking: req.think,
            system_prompts: vec![],
        };

        match req.mode {
            QueryMode::Fast => self.run_fast(&conversation, &req.prompt, &opts, &tx, cancel).await,
            QueryMode::Normal => {
                self.run_normal(project_id, &conversation, &req.prompt, &opts, &tx, cancel)
                    .await
            }
            QueryMode::Agentic => {
                self.run_agentic(project_id, &conversation, &opts, &tx, cancel).await
            }
        }
    }

    /// Resolves §4.7's pending client-tool protocol: when the previous turn
    /// suspended on a client tool, `req.prompt` is consumed as its answer
    /// (or, absent a `tool_id`, the pending tool is closed out with a
    /// literal "No answer" and `req.prompt` starts a fresh user turn). A
    /// mismatched `tool_id` errors out before any message is persisted.
    /// Either way, by the time this returns, the conversation's persisted
    /// history is exactly the thread the next model call should see.
    async fn resolve_pending_tool(&self, conversation: &Conversation, req: &QueryRequest) -> Result<()> {
        let last = self.conversations.last_message(conversation.id).await?;
        let pending = last.filter(|m| {
            m.role == MessageRole::AssistantToolCall.as_str() && m.tool_execution == ToolExecution::Client.as_str()
        });

        let Some(pending) = pending else {
            self.conversations
                .append_message(conversation.id, NewMessage::user(&req.prompt))
                .await?;
            return Ok(());
        };

        let pending_id = pending.tool_call_id.clone().unwrap_or_default();
        match &req.tool_id {
            Some(tool_id) if *tool_id == pending_id => {
                self.conversations
                    .append_message(
                        conversation.id,
                        NewMessage::tool_result(pending_id, pending.tool_name.clone(), &req.prompt),
                    )
                    .await?;
                Ok(())
            }
            Some(tool_id) => Err(ChatError::Conflict(format!(
                "tool_id mismatch: expected {pending_id}, got {tool_id}"
            ))),
            None => {
                self.conversations
                    .append_message(
                        conversation.id,
                        NewMessage::tool_result(pending_id, pending.tool_name.clone(), "No answer"),
                    )
                    .await?;
                self.conversations
                    .append_message(conversation.id, NewMessage::user(&req.prompt))
                    .await?;
                Ok(())
            }
        }
    }

    async fn run_fast(
        &self,
        conversation: &Conversation,
        prompt: &str,
        opts: &CallOptions,
        tx: &mpsc::Sender<StreamFrame>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let summary = self.aggregated_entity_summary(conversation.project_id).await?;
        let full_prompt = format!(
            "Answer the question using only the project summary below.\n\n{summary}\n\nQuestion: {prompt}\n\n\
             Respond with JSON matching {{\"answer\": string}}."
        );
        let parsed: FastAnswer = self.ai.complete_structured(&full_prompt, opts, cancel).await?;

        self.conversations
            .append_message(conversation.id, NewMessage::assistant(&parsed.answer))
            .await?;
        let _ = tx
            .send(StreamFrame::Content {
                delta: parsed.answer,
            })
            .await;
        let _ = tx.send(StreamFrame::Done { stop_reason: "stop".to_string() }).await;
        Ok(())
    }

    async fn aggregated_entity_summary(&self, project_id: i64) -> Result<String> {
        let types = self.store.get_entity_types(project_id).await?;
        if types.is_empty() {
            return Ok("No entities indexed for this project yet.".to_string());
        }
        let mut summary = String::from("Known entity types in this project:\n");
        for (entity_type, count) in types {
            summary.push_str(&format!("- {entity_type}: {count}\n"));
        }
        Ok(summary)
    }

    async fn run_normal(
        &self,
        project_id: i64,
        conversation: &Conversation,
        prompt: &str,
        opts: &CallOptions,
        tx: &mpsc::Sender<StreamFrame>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let context = build_context(
            &self.store,
            &self.ai,
            project_id,
            prompt,
            self.chat_config.top_k_entities as i64,
            self.chat_config.top_k_relationships as i64,
            cancel,
        )
        .await?;

        let mut opts = opts.clone();
        opts.system_prompts.push(match context {
            Some(context) => format!(
                "Answer using only the context below. Cite every claim inline with the \
                 `[[id]]` token exactly as given; never invent an id.\n\n{context}"
            ),
            None => "No relevant project context was found; say so rather than guessing.".to_string(),
        });

        let messages = vec![ChatMessage::user(prompt)];
        let (tx_internal, rx_internal) = mpsc::channel(16);
        let forward = tokio::spawn(forward_stream(self.store.clone(), rx_internal, tx.clone()));
        let outcome = self.ai.chat_stream(&messages, &opts, cancel, tx_internal).await;
        let content = forward.await.unwrap_or_default();

        match outcome {
            Ok(_) => {
                self.conversations
                    .append_message(conversation.id, NewMessage::assistant(&content))
                    .await?;
                let _ = tx.send(StreamFrame::Done { stop_reason: "stop".to_string() }).await;
                Ok(())
            }
            Err(e) => {
                let _ = tx.send(StreamFrame::Error { message: e.to_string() }).await;
                Err(ChatError::from(e))
            }
        }
    }

    async fn run_agentic(
        &self,
        project_id: i64,
        conversation: &Conversation,
        opts: &CallOptions,
        tx: &mpsc::Sender<StreamFrame>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let tool_set = build_tool_set(self.store.clone(), self.ai.clone(), project_id);
        let (handlers, mut tool_defs) = build_tool_handlers(tool_set);
        let mut suspend_on = Vec::new();
        if self.enable_query_clarification {
            tool_defs.push(ask_clarifying_questions_tool());
            suspend_on.push(ASK_CLARIFYING_QUESTIONS.to_string());
        }

        let thread = self.load_thread(conversation.id).await?;
        let initial_len = thread.len();

        let (tx_internal, rx_internal) = mpsc::channel(16);
        let forward = tokio::spawn(forward_stream(self.store.clone(), rx_internal, tx.clone()));
        let result = self
            .ai
            .chat_stream_with_tools(
                thread,
                tool_defs,
                &handlers,
                TOOL_LOOP_MAX_ROUNDS_CHAT,
                &suspend_on,
                opts,
                cancel,
                tx_internal,
            )
            .await;
        let content = forward.await.unwrap_or_default();

        let loop_result = match result {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(StreamFrame::Error { message: e.to_string() }).await;
                return Err(ChatError::from(e));
            }
        };

        let new_messages = &loop_result.thread[initial_len..];
        for (i, msg) in new_messages.iter().enumerate() {
            let is_suspended_call = loop_result
                .suspended_on
                .as_ref()
                .map(|call| i == new_messages.len() - 1 && Some(&call.id) == msg.tool_call_id.as_ref())
                .unwrap_or(false);
            let execution = matches!(msg.role, MessageRole::AssistantToolCall)
                .then_some(if is_suspended_call { ToolExecution::Client } else { ToolExecution::Server });
            self.conversations
                .append_message(conversation.id, new_message_from_thread(msg, execution))
                .await?;
        }

        if let Some(call) = &loop_result.suspended_on {
            let _ = tx
                .send(StreamFrame::ClientToolCall {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.input.clone(),
                })
                .await;
            let _ = tx.send(StreamFrame::Done { stop_reason: "suspended".to_string() }).await;
        } else {
            self.conversations
                .append_message(conversation.id, NewMessage::assistant(&content))
                .await?;
            let _ = tx
                .send(StreamFrame::Done {
                    stop_reason: loop_result.outcome.stop_reason.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn load_thread(&self, conversation_id: i64) -> Result<Vec<ThreadMessage>> {
        let messages = self.conversations.list_messages(conversation_id).await?;
        Ok(messages.iter().map(thread_message_from_persisted).collect())
    }
}

fn ask_clarifying_questions_tool() -> ToolDefinition {
    ToolDefinition {
        name: ASK_CLARIFYING_QUESTIONS.to_string(),
        description: "Ask the user one or more clarifying questions before continuing; the turn \
                       pauses until the frontend supplies an answer."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "questions": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["questions"]
        }),
    }
}

fn thread_message_from_persisted(m: &Message) -> ThreadMessage {
    ThreadMessage {
        role: message_role_from_str(&m.role),
        content: m.content.clone(),
        tool_call_id: m.tool_call_id.clone(),
        tool_name: m.tool_name.clone(),
        tool_arguments: m.tool_arguments.clone(),
    }
}

fn new_message_from_thread(m: &ThreadMessage, execution: Option<ToolExecution>) -> NewMessage {
    NewMessage {
        role: m.role,
        content: m.content.clone(),
        tool_call_id: m.tool_call_id.clone(),
        tool_name: m.tool_name.clone(),
        tool_arguments: m.tool_arguments.clone(),
        tool_execution: execution,
        reasoning: None,
    }
}

/// Drains provider stream events into external [`StreamFrame`]s, resolving
/// recognised citation tokens against the store as they complete. Returns
/// the full assistant content (citation tokens rewritten to their resolved
/// `public_id`, or left as literal text when resolution fails) for
/// persistence once the caller's `await` on the AI call returns.
async fn forward_stream(
    store: Arc<GraphStore>,
    mut rx: mpsc::Receiver<StreamEvent>,
    tx: mpsc::Sender<StreamFrame>,
) -> String {
    let mut parser = CitationParser::new();
    let mut content = String::new();

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Reasoning { delta } => {
                let _ = tx.send(StreamFrame::Reasoning { delta }).await;
            }
            StreamEvent::Content { delta } => {
                // Bracket repair runs per delta rather than over the full
                // buffered answer: provider chunks are many-token segments
                // in practice, so a malformed bracket run split exactly
                // across a chunk boundary just passes `normalize` unrepaired
                // rather than getting corrupted.
                let delta = normalize(&delta);
                for scan_event in parser.feed(&delta) {
                    emit_scan_event(&store, &tx, &mut content, scan_event).await;
                }
            }
            StreamEvent::Step { name } => {
                let _ = tx.send(StreamFrame::Step { name }).await;
            }
            StreamEvent::ToolCall { id, name, arguments } => {
                let _ = tx
                    .send(StreamFrame::Tool {
                        call_id: id,
                        name,
                        arguments: Some(arguments),
                        result: None,
                    })
                    .await;
            }
            StreamEvent::ToolResult { id, name, result, is_error: _ } => {
                let _ = tx
                    .send(StreamFrame::Tool {
                        call_id: id,
                        name,
                        arguments: None,
                        result: Some(result),
                    })
                    .await;
            }
            StreamEvent::Done { tokens_in, tokens_out, .. } => {
                let _ = tx.send(StreamFrame::Metrics { tokens_in, tokens_out }).await;
            }
            StreamEvent::Error { message } => {
                let _ = tx.send(StreamFrame::Error { message }).await;
            }
        }
    }

    for scan_event in parser.finish() {
        emit_scan_event(&store, &tx, &mut content, scan_event).await;
    }

    content
}

async fn emit_scan_event(
    store: &Arc<GraphStore>,
    tx: &mpsc::Sender<StreamFrame>,
    content: &mut String,
    event: ScanEvent,
) {
    match event {
        ScanEvent::Text(text) => {
            content.push_str(&text);
            let _ = tx.send(StreamFrame::Content { delta: text }).await;
        }
        ScanEvent::Token(id) => match resolve_citation(store, &id).await {
            Some((name, key)) => {
                content.push_str(&format!("[[{id}]]"));
                let _ = tx
                    .send(StreamFrame::Citation {
                        id,
                        name,
                        key,
                    })
                    .await;
            }
            None => {
                let raw = format!("[[{id}]]");
                content.push_str(&raw);
                let _ = tx.send(StreamFrame::Content { delta: raw }).await;
            }
        },
    }
}

/// Resolves a citation token's `public_id` to the owning document's
/// `(file_name, file_key)`, or `None` when the id doesn't name a known text
/// unit (§8 "unresolvable citations pass through as literal text").
async fn resolve_citation(store: &GraphStore, public_id: &str) -> Option<(String, String)> {
    let unit = store.get_text_unit_by_public_id(public_id).await.ok()??;
    let rows = store
        .get_source_document_metadata(&[unit.public_id.clone()])
        .await
        .ok()?;
    rows.into_iter()
        .find(|(unit_public_id, ..)| *unit_public_id == unit.public_id)
        .map(|(_, file_name, file_key, _)| (file_name, file_key))
}
