//! AI capability port (C1): a single `AiPort` trait with an OpenAI-compatible
//! cloud implementation and an Ollama local implementation, layered under
//! [`client::AiClient`] which adds structured completion, embeddings,
//! metered concurrency, and the bounded agentic tool loop.

pub mod client;
pub mod embed;
pub mod error;
pub mod json_repair;
pub mod metrics;
pub mod ollama;
pub mod openai;
pub mod port;
pub mod tool_loop;
pub mod types;

pub use client::{AiClient, AiClientConfig};
pub use error::{AiError, Result};
pub use metrics::ProviderMetrics;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use port::{AiPort, ChatRequest};
pub use tool_loop::{ToolHandler, ToolHandlers, ToolLoopResult};

use std::sync::Arc;

use kiwi_core::config::{AiAdapter, AiConfig};

/// Builds the configured [`AiPort`] implementation from `[ai]` config (§6
/// `AI_ADAPTER ∈ {openai, ollama}`).
pub fn build_provider(config: &AiConfig) -> Arc<dyn AiPort> {
    match config.adapter {
        AiAdapter::Openai => Arc::new(OpenAiProvider::new(
            config.chat_url.clone(),
            config.chat_key.clone().unwrap_or_default(),
            config.embed_model.clone(),
            config.embed_dim,
        )),
        AiAdapter::Ollama => Arc::new(OllamaProvider::new(
            config.chat_url.clone(),
            config.embed_model.clone(),
            config.embed_dim,
        )),
    }
}

/// Builds a ready-to-use [`AiClient`] from `[ai]` config and a `timeout_min`
/// (worker or server, §4.1/§6 "`<=0` disables"), sharing one [`ProviderMetrics`]
/// registry across every op (§4.1.1).
pub fn build_client(config: &AiConfig, timeout_min: i64, metrics: Arc<ProviderMetrics>) -> AiClient {
    let provider = build_provider(config);
    let timeout = if timeout_min > 0 {
        Some(std::time::Duration::from_secs((timeout_min as u64) * 60))
    } else {
        None
    };
    AiClient::new(
        provider,
        metrics,
        AiClientConfig {
            default_model: config.chat_model.clone(),
            default_temperature_complete: 0.3,
            default_temperature_structured: 0.1,
            default_temperature_chat: 0.2,
            embed_dim: config.embed_dim,
            chat_concurrency: config.parallel_req,
            embed_concurrency: config.parallel_req,
            image_concurrency: config.parallel_req,
            timeout,
        },
    )
}
