//! OpenAI-compatible provider (§4.1, §9 "cloud" adapter), grounded on the
//! teacher's `openai.rs`: same request-shaping and SSE-parsing approach,
//! generalized from Anthropic-content-block conversion to kiwi's own
//! [`ThreadMessage`] shape and extended with embeddings, vision and
//! transcription endpoints the teacher's text-only agent never needed.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use kiwi_core::MessageRole;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::{AiError, Result};
use crate::port::{AiPort, ChatRequest};
use crate::types::{ChatOutcome, StreamEvent, ThreadMessage, ToolCall};

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    embed_model: String,
    embed_dim: usize,
    name: &'static str,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        embed_model: impl Into<String>,
        embed_dim: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            embed_model: embed_model.into(),
            embed_dim,
            name: "openai",
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Groups consecutive `AssistantToolCall` thread entries (one per call,
/// per [`crate::tool_loop`]) into a single OpenAI assistant message carrying
/// a `tool_calls` array, since OpenAI expects one call-bearing message per
/// round rather than one message per call.
fn build_messages(req: &ChatRequest) -> Vec<Value> {
    let mut out = Vec::with_capacity(req.thread.len() + 1);
    if !req.system.is_empty() {
        out.push(json!({ "role": "system", "content": req.system }));
    }

    let mut pending_calls: Vec<Value> = Vec::new();
    let mut pending_content: Option<String> = None;

    let flush = |out: &mut Vec<Value>, calls: &mut Vec<Value>, content: &mut Option<String>| {
        if calls.is_empty() {
            return;
        }
        out.push(json!({
            "role": "assistant",
            "content": content.take(),
            "tool_calls": std::mem::take(calls),
        }));
    };

    for msg in &req.thread {
        match msg.role {
            MessageRole::User => {
                flush(&mut out, &mut pending_calls, &mut pending_content);
                out.push(json!({ "role": "user", "content": msg.content }));
            }
            MessageRole::System => {
                flush(&mut out, &mut pending_calls, &mut pending_content);
                out.push(json!({ "role": "system", "content": msg.content }));
            }
            MessageRole::Assistant => {
                flush(&mut out, &mut pending_calls, &mut pending_content);
                out.push(json!({ "role": "assistant", "content": msg.content }));
            }
            MessageRole::AssistantToolCall => {
                pending_content = Some(msg.content.clone());
                pending_calls.push(json!({
                    "id": msg.tool_call_id.clone().unwrap_or_default(),
                    "type": "function",
                    "function": {
                        "name": msg.tool_name.clone().unwrap_or_default(),
                        "arguments": msg
                            .tool_arguments
                            .clone()
                            .unwrap_or(Value::Null)
                            .to_string(),
                    },
                }));
            }
            MessageRole::Tool => {
                flush(&mut out, &mut pending_calls, &mut pending_content);
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                }));
            }
        }
    }
    flush(&mut out, &mut pending_calls, &mut pending_content);
    out
}

fn build_request_body(req: &ChatRequest, stream: bool) -> Value {
    let mut body = json!({
        "model": req.model,
        "messages": build_messages(req),
        "stream": stream,
    });
    if req.thinking.is_some() {
        // Reasoning models on the OpenAI-compatible default endpoint reject
        // any temperature other than 1.0 (§4.1).
        body["temperature"] = json!(1.0);
    } else if req.temperature > 0.0 {
        body["temperature"] = json!(req.temperature);
    }
    if req.max_tokens > 0 {
        body["max_tokens"] = json!(req.max_tokens);
    }
    if !req.tools.is_empty() {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    },
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }
    body
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessageOut,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn parse_response(resp: ApiResponse) -> ChatOutcome {
    let choice = resp.choices.into_iter().next().unwrap_or(Choice {
        message: ChatMessageOut {
            content: None,
            tool_calls: Vec::new(),
        },
        finish_reason: None,
    });
    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            input: serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null),
        })
        .collect();
    let stop_reason = match choice.finish_reason.as_deref() {
        Some("tool_calls") => "tool_use".to_string(),
        Some(other) => other.to_string(),
        None => "stop".to_string(),
    };
    ChatOutcome {
        content: choice.message.content.unwrap_or_default(),
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        stop_reason,
        tool_calls,
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    model: String,
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

async fn process_openai_stream(
    resp: reqwest::Response,
    fallback_model: &str,
    tx: mpsc::Sender<StreamEvent>,
) -> Result<ChatOutcome> {
    use futures_util::StreamExt;

    let mut byte_stream = resp.bytes_stream();
    let mut buffer = String::new();
    let mut content = String::new();
    let mut model = fallback_model.to_string();
    let mut tokens_in = 0u32;
    let mut tokens_out = 0u32;
    let mut stop_reason = "stop".to_string();
    let mut calls: Vec<PendingCall> = Vec::new();

    'outer: while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(AiError::Http)?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
            buffer.drain(..=newline_pos);

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                break 'outer;
            }
            let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) else {
                continue;
            };
            if !parsed.model.is_empty() {
                model = parsed.model;
            }
            if let Some(usage) = parsed.usage {
                tokens_in = usage.prompt_tokens;
                tokens_out = usage.completion_tokens;
            }
            for choice in parsed.choices {
                if let Some(reasoning) = choice.delta.reasoning {
                    if !reasoning.is_empty() {
                        let _ = tx.send(StreamEvent::Reasoning { delta: reasoning }).await;
                    }
                }
                if let Some(text) = choice.delta.content {
                    if !text.is_empty() {
                        content.push_str(&text);
                        let _ = tx.send(StreamEvent::Content { delta: text }).await;
                    }
                }
                for delta in choice.delta.tool_calls {
                    while calls.len() <= delta.index {
                        calls.push(PendingCall {
                            id: String::new(),
                            name: String::new(),
                            arguments: String::new(),
                        });
                    }
                    let entry = &mut calls[delta.index];
                    if let Some(id) = delta.id {
                        entry.id = id;
                    }
                    if let Some(f) = delta.function {
                        if let Some(name) = f.name {
                            entry.name = name;
                        }
                        if let Some(args) = f.arguments {
                            entry.arguments.push_str(&args);
                        }
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    stop_reason = if reason == "tool_calls" {
                        "tool_use".to_string()
                    } else {
                        reason
                    };
                }
            }
        }
    }

    let tool_calls: Vec<ToolCall> = calls
        .into_iter()
        .map(|c| {
            let input = serde_json::from_str(&c.arguments).unwrap_or(Value::Null);
            ToolCall {
                id: c.id,
                name: c.name,
                input,
            }
        })
        .collect();
    for call in &tool_calls {
        let _ = tx
            .send(StreamEvent::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.input.clone(),
            })
            .await;
    }

    let outcome = ChatOutcome {
        content,
        model,
        tokens_in,
        tokens_out,
        stop_reason,
        tool_calls,
    };
    let _ = tx
        .send(StreamEvent::Done {
            model: outcome.model.clone(),
            tokens_in: outcome.tokens_in,
            tokens_out: outcome.tokens_out,
            stop_reason: outcome.stop_reason.clone(),
        })
        .await;
    Ok(outcome)
}

#[async_trait]
impl AiPort for OpenAiProvider {
    fn provider_name(&self) -> &str {
        self.name
    }

    fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatOutcome> {
        let body = build_request_body(req, false);
        let resp = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1)
                * 1000;
            return Err(AiError::RateLimited { retry_after_ms });
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status, message });
        }
        let parsed: ApiResponse = resp.json().await?;
        Ok(parse_response(parsed))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<ChatOutcome> {
        let body = build_request_body(req, true);
        let resp = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status, message });
        }
        process_openai_stream(resp, &req.model, tx).await
    }

    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(self.url("/embeddings"))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.embed_model, "input": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status, message });
        }
        #[derive(Deserialize)]
        struct EmbedResponse {
            data: Vec<EmbedData>,
        }
        #[derive(Deserialize)]
        struct EmbedData {
            embedding: Vec<f32>,
        }
        let parsed: EmbedResponse = resp.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AiError::Parse("empty embeddings response".into()))
    }

    async fn describe_image(&self, prompt: &str, image: &[u8]) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:image/png;base64,{encoded}");
        let body = json!({
            "model": self.embed_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ],
            }],
            "stream": false,
        });
        let resp = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status, message });
        }
        let parsed: ApiResponse = resp.json().await?;
        Ok(parse_response(parsed).content)
    }

    async fn transcribe_audio(&self, bytes: &[u8], language: Option<&str>) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name("audio.wav");
        let mut form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .part("file", part);
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }
        let resp = self
            .client
            .post(self.url("/audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status, message });
        }
        #[derive(Deserialize)]
        struct TranscriptResponse {
            text: String,
        }
        let parsed: TranscriptResponse = resp.json().await?;
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_consecutive_tool_calls_into_one_assistant_message() {
        let req = ChatRequest {
            model: "gpt-4o-mini".into(),
            system: "be helpful".into(),
            thread: vec![
                ThreadMessage::user("find x"),
                ThreadMessage {
                    role: MessageRole::AssistantToolCall,
                    content: "".into(),
                    tool_call_id: Some("call_1".into()),
                    tool_name: Some("search".into()),
                    tool_arguments: Some(json!({"q": "x"})),
                },
                ThreadMessage {
                    role: MessageRole::Tool,
                    content: "found it".into(),
                    tool_call_id: Some("call_1".into()),
                    tool_name: Some("search".into()),
                    tool_arguments: None,
                },
            ],
            tools: vec![],
            temperature: 0.0,
            max_tokens: 0,
            thinking: None,
        };
        let messages = build_messages(&req);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn parses_tool_calls_response_into_tool_use_stop_reason() {
        let raw = json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "search", "arguments": "{\"q\":\"x\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let outcome = parse_response(parsed);
        assert_eq!(outcome.stop_reason, "tool_use");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].name, "search");
        assert!(outcome.wants_tools());
    }

    #[test]
    fn thinking_forces_temperature_to_one() {
        let req = ChatRequest {
            model: "o1".into(),
            system: String::new(),
            thread: vec![ThreadMessage::user("hi")],
            tools: vec![],
            temperature: 0.1,
            max_tokens: 0,
            thinking: Some(crate::types::Thinking::High),
        };
        let body = build_request_body(&req, false);
        assert_eq!(body["temperature"], 1.0);
    }
}
