//! Local Ollama provider (§4.1, §9 "local" adapter), grounded on the
//! teacher's `ollama.rs`: newline-delimited JSON streaming rather than SSE,
//! `options.num_predict` for the token budget. Ollama's tool-call arguments
//! arrive as a JSON object directly (unlike OpenAI's JSON-encoded string),
//! so the conversion in [`parse_response`] differs from `openai.rs` there.

use async_trait::async_trait;
use kiwi_core::MessageRole;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::{AiError, Result};
use crate::port::{AiPort, ChatRequest};
use crate::types::{ChatOutcome, StreamEvent, ToolCall};

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    embed_model: String,
    embed_dim: usize,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, embed_model: impl Into<String>, embed_dim: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            embed_model: embed_model.into(),
            embed_dim,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn build_messages(req: &ChatRequest) -> Vec<Value> {
    let mut out = Vec::with_capacity(req.thread.len() + 1);
    if !req.system.is_empty() {
        out.push(json!({ "role": "system", "content": req.system }));
    }
    for msg in &req.thread {
        match msg.role {
            MessageRole::User => out.push(json!({ "role": "user", "content": msg.content })),
            MessageRole::System => out.push(json!({ "role": "system", "content": msg.content })),
            MessageRole::Assistant => {
                out.push(json!({ "role": "assistant", "content": msg.content }))
            }
            MessageRole::AssistantToolCall => out.push(json!({
                "role": "assistant",
                "content": msg.content,
                "tool_calls": [{
                    "function": {
                        "name": msg.tool_name.clone().unwrap_or_default(),
                        "arguments": msg.tool_arguments.clone().unwrap_or(Value::Null),
                    }
                }],
            })),
            MessageRole::Tool => out.push(json!({ "role": "tool", "content": msg.content })),
        }
    }
    out
}

fn build_request_body(req: &ChatRequest, stream: bool) -> Value {
    let mut body = json!({
        "model": req.model,
        "messages": build_messages(req),
        "stream": stream,
        "options": { "num_predict": if req.max_tokens > 0 { req.max_tokens } else { -1 } },
    });
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
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn parse_response(resp: ApiResponse) -> ChatOutcome {
    let tool_calls: Vec<ToolCall> = resp
        .message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, tc)| ToolCall {
            id: format!("ollama-call-{i}"),
            name: tc.function.name,
            input: tc.function.arguments,
        })
        .collect();
    let stop_reason = if !tool_calls.is_empty() {
        "tool_use".to_string()
    } else {
        "stop".to_string()
    };
    ChatOutcome {
        content: resp.message.content,
        model: resp.model,
        tokens_in: resp.prompt_eval_count,
        tokens_out: resp.eval_count,
        stop_reason,
        tool_calls,
    }
}

/// Ollama streams one JSON object per line, unterminated by any sentinel;
/// the final object carries `"done": true` with the token counts.
async fn process_ollama_stream(
    resp: reqwest::Response,
    fallback_model: &str,
    tx: mpsc::Sender<StreamEvent>,
) -> Result<ChatOutcome> {
    use futures_util::StreamExt;

    let mut byte_stream = resp.bytes_stream();
    let mut buffer = String::new();
    let mut content = String::new();
    let mut last: Option<ApiResponse> = None;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(AiError::Http)?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].to_string();
            buffer.drain(..=newline_pos);
            if line.trim().is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<ApiResponse>(&line) else {
                continue;
            };
            if !parsed.message.content.is_empty() {
                content.push_str(&parsed.message.content);
                let _ = tx
                    .send(StreamEvent::Content {
                        delta: parsed.message.content.clone(),
                    })
                    .await;
            }
            let done = parsed.done;
            last = Some(parsed);
            if done {
                break;
            }
        }
    }

    let mut outcome = last
        .map(parse_response)
        .unwrap_or_else(|| ChatOutcome {
            model: fallback_model.to_string(),
            ..Default::default()
        });
    outcome.content = content;
    for call in &outcome.tool_calls {
        let _ = tx
            .send(StreamEvent::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.input.clone(),
            })
            .await;
    }
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
impl AiPort for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatOutcome> {
        let body = build_request_body(req, false);
        let resp = self
            .client
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await?;
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
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status, message });
        }
        process_ollama_stream(resp, &req.model, tx).await
    }

    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(self.url("/api/embeddings"))
            .json(&json!({ "model": self.embed_model, "prompt": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status, message });
        }
        #[derive(Deserialize)]
        struct EmbedResponse {
            embedding: Vec<f32>,
        }
        let parsed: EmbedResponse = resp.json().await?;
        Ok(parsed.embedding)
    }

    async fn describe_image(&self, prompt: &str, image: &[u8]) -> Result<String> {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let resp = self
            .client
            .post(self.url("/api/chat"))
            .json(&json!({
                "model": self.embed_model,
                "stream": false,
                "messages": [{
                    "role": "user",
                    "content": prompt,
                    "images": [encoded],
                }],
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status, message });
        }
        let parsed: ApiResponse = resp.json().await?;
        Ok(parsed.message.content)
    }

    async fn transcribe_audio(&self, _bytes: &[u8], _language: Option<&str>) -> Result<String> {
        Err(AiError::Unavailable(
            "ollama adapter does not support audio transcription".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_call_arguments_as_object_not_string() {
        let raw = json!({
            "model": "llama3.1",
            "message": {
                "content": "",
                "tool_calls": [{ "function": { "name": "search", "arguments": { "q": "x" } } }]
            },
            "done": true,
            "prompt_eval_count": 8,
            "eval_count": 3
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let outcome = parse_response(parsed);
        assert_eq!(outcome.stop_reason, "tool_use");
        assert_eq!(outcome.tool_calls[0].input, json!({"q": "x"}));
    }

    #[test]
    fn no_tool_calls_yields_stop_reason() {
        let raw = json!({
            "model": "llama3.1",
            "message": { "content": "hi", "tool_calls": [] },
            "done": true,
            "prompt_eval_count": 1,
            "eval_count": 1
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let outcome = parse_response(parsed);
        assert_eq!(outcome.stop_reason, "stop");
        assert!(!outcome.wants_tools());
    }
}
