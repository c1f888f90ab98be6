//! The provider-facing capability port (§4.1), grounded on the teacher's
//! `LlmProvider` trait (`provider.rs`): one low-level `send`/`send_stream`
//! pair per provider, with the richer op set (`Complete`, `CompleteStructured`,
//! `ChatWithTools`, embeddings, image/audio) layered on top in
//! [`crate::client::AiClient`] rather than duplicated per provider.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{ChatOutcome, StreamEvent, ThreadMessage, Thinking, ToolDefinition};

/// A raw chat request as sent to a provider. `tools` is empty for plain
/// completions; non-empty requests enable tool-calling (§4.1, §4.8).
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub thread: Vec<ThreadMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Reasoning-effort hint (§4.1). The OpenAI-compatible provider forces
    /// `temperature` to 1.0 whenever this is set, a known reasoning-model
    /// constraint.
    pub thinking: Option<Thinking>,
}

#[async_trait]
pub trait AiPort: Send + Sync {
    /// Short identifier used as the `provider` key in [`crate::metrics::ProviderMetrics`].
    fn provider_name(&self) -> &str;

    /// Dimensionality this provider's embedding model returns (§8).
    fn embed_dim(&self) -> usize;

    async fn send(&self, req: &ChatRequest) -> Result<ChatOutcome>;

    /// Streaming variant. Providers that have no native streaming endpoint
    /// can rely on the default, which calls [`AiPort::send`] once and
    /// replays it as a single `Content` + `Done` pair.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<ChatOutcome> {
        let outcome = self.send(req).await?;
        let _ = tx
            .send(StreamEvent::Content {
                delta: outcome.content.clone(),
            })
            .await;
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

    /// Raw, unshaped embedding vector for one input. Zero-vector handling
    /// for empty/whitespace input lives in [`crate::embed::shape_embedding`]
    /// and is applied by the caller, not the provider.
    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>>;

    async fn describe_image(&self, prompt: &str, image: &[u8]) -> Result<String>;

    async fn transcribe_audio(&self, bytes: &[u8], language: Option<&str>) -> Result<String>;
}
