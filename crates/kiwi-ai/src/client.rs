//! The public C1 surface (§4.1): every op downstream crates call, layered
//! over one injected [`AiPort`] provider. Concurrency is gated per channel
//! (chat/embed/image) rather than globally, matching §4.1's "adapters share
//! one provider instance but bound concurrency independently per call kind".

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use kiwi_core::retry::{retry_with_cancel, RetryPolicy};

use crate::embed::shape_embedding;
use crate::error::{AiError, Result};
use crate::json_repair;
use crate::metrics::{Outcome, ProviderMetrics};
use crate::port::{AiPort, ChatRequest};
use crate::tool_loop::{self, ToolHandlers, ToolLoopResult};
use crate::types::{CallOptions, ChatMessage, ChatOutcome, Role, StreamEvent, ThreadMessage, ToolDefinition};

/// Which op a [`ChatRequest`] is being built for, so
/// [`AiClient::temperature_for`] can apply the right per-op default (§4.1:
/// "0.3 complete / 0.1 structured / 0.2 chat").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Complete,
    CompleteStructured,
    Chat,
}

pub struct AiClientConfig {
    pub default_model: String,
    pub default_temperature_complete: f32,
    pub default_temperature_structured: f32,
    pub default_temperature_chat: f32,
    pub embed_dim: usize,
    pub chat_concurrency: usize,
    pub embed_concurrency: usize,
    pub image_concurrency: usize,
    /// `None` disables the per-call deadline (§4.1 "<=0 disables").
    pub timeout: Option<Duration>,
}

pub struct AiClient {
    provider: Arc<dyn AiPort>,
    metrics: Arc<ProviderMetrics>,
    config: AiClientConfig,
    chat_sema: Arc<Semaphore>,
    embed_sema: Arc<Semaphore>,
    image_sema: Arc<Semaphore>,
    retry_policy: RetryPolicy,
}

impl AiClient {
    pub fn new(provider: Arc<dyn AiPort>, metrics: Arc<ProviderMetrics>, config: AiClientConfig) -> Self {
        let chat_sema = Arc::new(Semaphore::new(config.chat_concurrency.max(1)));
        let embed_sema = Arc::new(Semaphore::new(config.embed_concurrency.max(1)));
        let image_sema = Arc::new(Semaphore::new(config.image_concurrency.max(1)));
        Self {
            provider,
            metrics,
            config,
            chat_sema,
            embed_sema,
            image_sema,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Configured embedding dimension, for callers that need the zero-vector
    /// shape without issuing a call (e.g. an empty-query tool search, §8).
    pub fn embed_dim(&self) -> usize {
        self.config.embed_dim
    }

    fn model_for(&self, opts: &CallOptions) -> String {
        opts.model.clone().unwrap_or_else(|| self.config.default_model.clone())
    }

    fn temperature_for(&self, opts: &CallOptions, op: Op) -> f32 {
        opts.temperature.unwrap_or(match op {
            Op::Complete => self.config.default_temperature_complete,
            Op::CompleteStructured => self.config.default_temperature_structured,
            Op::Chat => self.config.default_temperature_chat,
        })
    }

    async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match self.config.timeout {
            Some(d) => tokio::time::timeout(d, fut)
                .await
                .unwrap_or(Err(AiError::Timeout(d))),
            None => fut.await,
        }
    }

    fn thread_from_messages(system: &str, messages: &[ChatMessage]) -> (String, Vec<ThreadMessage>) {
        let mut system_parts = vec![system.to_string()];
        let mut thread = Vec::with_capacity(messages.len());
        for m in messages {
            match m.role {
                Role::System => system_parts.push(m.content.clone()),
                Role::User => thread.push(ThreadMessage::user(m.content.clone())),
                Role::Assistant => thread.push(ThreadMessage::assistant(m.content.clone())),
            }
        }
        (system_parts.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n\n"), thread)
    }

    fn build_request(&self, system: String, thread: Vec<ThreadMessage>, tools: Vec<ToolDefinition>, opts: &CallOptions, op: Op) -> ChatRequest {
        ChatRequest {
            model: self.model_for(opts),
            system,
            thread,
            tools,
            temperature: self.temperature_for(opts, op),
            max_tokens: 0,
            thinking: opts.thinking,
        }
    }

    /// §4.1 `Complete`: single-shot prompt completion, no conversation state.
    pub async fn complete(&self, prompt: &str, opts: &CallOptions, cancel: &CancellationToken) -> Result<String> {
        let system = opts.system_prompts.join("\n\n");
        let (system, thread) = Self::thread_from_messages(&system, &[ChatMessage::user(prompt)]);
        let req = self.build_request(system, thread, vec![], opts, Op::Complete);
        let outcome = self.send_metered(req, cancel).await?;
        Ok(outcome.content)
    }

    /// §4.1 `CompleteStructured`: as [`Self::complete`], with JSON-repair and
    /// deserialization into `T`. Returns [`AiError::Parse`] when repair
    /// cannot recover valid JSON matching `T`'s shape.
    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        opts: &CallOptions,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let system = opts.system_prompts.join("\n\n");
        let (system, thread) = Self::thread_from_messages(&system, &[ChatMessage::user(prompt)]);
        let req = self.build_request(system, thread, vec![], opts, Op::CompleteStructured);
        let outcome = self.send_metered(req, cancel).await?;
        json_repair::parse_structured(&outcome.content).map_err(|e| AiError::Parse(e.to_string()))
    }

    /// §4.1 `Chat`: a full conversation turn, no tool use.
    pub async fn chat(&self, messages: &[ChatMessage], opts: &CallOptions, cancel: &CancellationToken) -> Result<ChatOutcome> {
        let system = opts.system_prompts.join("\n\n");
        let (system, thread) = Self::thread_from_messages(&system, messages);
        let req = self.build_request(system, thread, vec![], opts, Op::Chat);
        self.send_metered(req, cancel).await
    }

    /// §4.1 `ChatStream`: as [`Self::chat`], streamed through `tx`.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        opts: &CallOptions,
        cancel: &CancellationToken,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<ChatOutcome> {
        let system = opts.system_prompts.join("\n\n");
        let (system, thread) = Self::thread_from_messages(&system, messages);
        let req = self.build_request(system, thread, vec![], opts, Op::Chat);
        self.send_stream_metered(req, cancel, tx).await
    }

    /// §4.1 `ChatWithTools` / §4.8: a bounded tool-calling loop. `max_rounds`
    /// is `kiwi_core::config::TOOL_LOOP_MAX_ROUNDS_CHAT` or `_EXTRACT`
    /// depending on the caller.
    #[allow(clippy::too_many_arguments)]
    pub async fn chat_with_tools(
        &self,
        thread: Vec<ThreadMessage>,
        tools: Vec<ToolDefinition>,
        handlers: &ToolHandlers,
        max_rounds: usize,
        suspend_on: &[String],
        opts: &CallOptions,
        cancel: &CancellationToken,
    ) -> Result<ToolLoopResult> {
        let system = opts.system_prompts.join("\n\n");
        let req = self.build_request(system, thread, tools, opts, Op::Chat);
        tool_loop::run_tool_loop(self, req, handlers, max_rounds, suspend_on, cancel).await
    }

    /// §4.1 `ChatStreamWithTools`: as [`Self::chat_with_tools`], streamed.
    #[allow(clippy::too_many_arguments)]
    pub async fn chat_stream_with_tools(
        &self,
        thread: Vec<ThreadMessage>,
        tools: Vec<ToolDefinition>,
        handlers: &ToolHandlers,
        max_rounds: usize,
        suspend_on: &[String],
        opts: &CallOptions,
        cancel: &CancellationToken,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<ToolLoopResult> {
        let system = opts.system_prompts.join("\n\n");
        let req = self.build_request(system, thread, tools, opts, Op::Chat);
        tool_loop::run_tool_loop_stream(self, req, handlers, max_rounds, suspend_on, cancel, tx).await
    }

    /// Low-level send used by [`crate::tool_loop`]; metered and retried like
    /// every other op but exposed crate-internally rather than publicly,
    /// since callers should go through the higher-level ops above.
    pub(crate) async fn send_metered(&self, req: ChatRequest, cancel: &CancellationToken) -> Result<ChatOutcome> {
        let _permit = self.chat_sema.acquire().await.map_err(|_| AiError::Cancelled)?;
        let provider_name = self.provider.provider_name().to_string();
        let model = req.model.clone();
        let started = Instant::now();
        let result = retry_with_cancel(self.retry_policy.clone(), cancel, AiError::is_transient, || {
            self.with_timeout(self.provider.send(&req))
        })
        .await;
        self.record(&provider_name, &model, "chat", started.elapsed(), &result);
        result
    }

    pub(crate) async fn send_stream_metered(
        &self,
        req: ChatRequest,
        cancel: &CancellationToken,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<ChatOutcome> {
        let _permit = self.chat_sema.acquire().await.map_err(|_| AiError::Cancelled)?;
        let provider_name = self.provider.provider_name().to_string();
        let model = req.model.clone();
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }
        let result = self.with_timeout(self.provider.send_stream(&req, tx)).await;
        self.record(&provider_name, &model, "chat_stream", started.elapsed(), &result);
        result
    }

    /// §4.1 `Embed`: zero-vector contract (§8) applied uniformly regardless
    /// of provider.
    pub async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(shape_embedding(text, vec![], self.config.embed_dim));
        }
        let _permit = self.embed_sema.acquire().await.map_err(|_| AiError::Cancelled)?;
        let provider_name = self.provider.provider_name().to_string();
        let started = Instant::now();
        let result = retry_with_cancel(self.retry_policy.clone(), cancel, AiError::is_transient, || {
            self.with_timeout(self.provider.embed_raw(text))
        })
        .await;
        self.record(&provider_name, "embed", "embed", started.elapsed(), &result);
        result.map(|raw| shape_embedding(text, raw, self.config.embed_dim))
    }

    /// §4.1 `EmbedBatch`: embeds every input independently, bounded by the
    /// embed channel's own concurrency rather than the caller's.
    pub async fn embed_batch(&self, texts: &[String], cancel: &CancellationToken) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text, cancel).await?);
        }
        Ok(out)
    }

    /// §4.1 `EmbedChunks`: embeds pre-chunked unit text; chunking itself is
    /// `kiwi-loader`'s responsibility, so this is an alias of
    /// [`Self::embed_batch`] kept distinct for call-site clarity.
    pub async fn embed_chunks(&self, chunks: &[String], cancel: &CancellationToken) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(chunks, cancel).await
    }

    /// §4.1 `DescribeImage`.
    pub async fn describe_image(&self, prompt: &str, image: &[u8], cancel: &CancellationToken) -> Result<String> {
        let _permit = self.image_sema.acquire().await.map_err(|_| AiError::Cancelled)?;
        let provider_name = self.provider.provider_name().to_string();
        let started = Instant::now();
        let result = retry_with_cancel(self.retry_policy.clone(), cancel, AiError::is_transient, || {
            self.with_timeout(self.provider.describe_image(prompt, image))
        })
        .await;
        self.record(&provider_name, "vision", "describe_image", started.elapsed(), &result);
        result
    }

    /// §4.1 `TranscribeAudio`.
    pub async fn transcribe_audio(&self, bytes: &[u8], language: Option<&str>, cancel: &CancellationToken) -> Result<String> {
        let _permit = self.image_sema.acquire().await.map_err(|_| AiError::Cancelled)?;
        let provider_name = self.provider.provider_name().to_string();
        let started = Instant::now();
        let result = retry_with_cancel(self.retry_policy.clone(), cancel, AiError::is_transient, || {
            self.with_timeout(self.provider.transcribe_audio(bytes, language))
        })
        .await;
        self.record(&provider_name, "audio", "transcribe_audio", started.elapsed(), &result);
        result
    }

    fn record(&self, provider: &str, model: &str, op: &str, elapsed: Duration, result: &Result<impl HasTokens>) {
        let outcome = match result {
            Ok(_) => Outcome::Ok,
            Err(AiError::Timeout(_)) => Outcome::Timeout,
            Err(_) => Outcome::Error,
        };
        let (tokens_in, tokens_out) = result.as_ref().map(|v| v.tokens()).unwrap_or((0, 0));
        self.metrics.record(provider, model, op, tokens_in, tokens_out, elapsed, outcome);
    }
}

/// Lets [`AiClient::record`] pull token counts from whichever op's success
/// type without a dozen near-identical overloads.
trait HasTokens {
    fn tokens(&self) -> (u32, u32);
}

impl HasTokens for ChatOutcome {
    fn tokens(&self) -> (u32, u32) {
        (self.tokens_in, self.tokens_out)
    }
}

impl HasTokens for Vec<f32> {
    fn tokens(&self) -> (u32, u32) {
        (0, 0)
    }
}

impl HasTokens for String {
    fn tokens(&self) -> (u32, u32) {
        (0, 0)
    }
}

