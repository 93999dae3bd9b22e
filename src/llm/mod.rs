//! LLM: multi-provider adapter layer.
//!
//! DESIGN
//! ======
//! Each catalog entry becomes one [`LlmClient`] when the registry loads. The
//! client is a closed enum over the supported wire protocols, chosen once
//! from the entry's provider kind; call sites only see the [`LlmChat`] trait.
//! All clients share one `reqwest::Client` carrying the configured timeouts.

pub mod anthropic;
pub mod config;
pub mod openai;
pub mod registry;
pub mod sse;
pub mod types;

use crate::config::LlmTimeouts;
use config::{ModelConfig, ProviderKind};
pub use types::LlmChat;
use types::{ChatResponse, ChunkStream, LlmError, Message, ToolDefinition};

/// Build the HTTP client shared by every provider adapter.
///
/// # Errors
///
/// Returns [`LlmError::HttpClientBuild`] if the TLS backend cannot initialize.
pub fn build_http_client(timeouts: LlmTimeouts) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeouts.request())
        .connect_timeout(timeouts.connect())
        .build()
        .map_err(|e| LlmError::HttpClientBuild(e.to_string()))
}

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete LLM client that dispatches to the adapter for its provider.
pub enum LlmClient {
    OpenAi(openai::OpenAiClient),
    Anthropic(anthropic::AnthropicClient),
}

impl LlmClient {
    /// Build the adapter for a resolved catalog entry.
    ///
    /// Anthropic requires `max_tokens` on every request, so it falls back to
    /// `default_max_tokens`; OpenAI-compatible servers only get it when the
    /// entry sets one.
    #[must_use]
    pub fn from_config(config: &ModelConfig, http: reqwest::Client, default_max_tokens: u32) -> Self {
        match config.provider {
            ProviderKind::OpenAi => Self::OpenAi(openai::OpenAiClient::new(
                http,
                config.api_key.clone(),
                &config.base_url,
                config.model.clone(),
                config.max_tokens,
            )),
            ProviderKind::Anthropic => Self::Anthropic(anthropic::AnthropicClient::new(
                http,
                config.api_key.clone(),
                &config.base_url,
                config.model.clone(),
                config.max_tokens.unwrap_or(default_max_tokens),
            )),
        }
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse, LlmError> {
        match self {
            Self::OpenAi(c) => c.chat(messages, tools).await,
            Self::Anthropic(c) => c.chat(messages, tools).await,
        }
    }

    async fn chat_stream(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChunkStream, LlmError> {
        match self {
            Self::OpenAi(c) => c.chat_stream(messages, tools).await,
            Self::Anthropic(c) => c.chat_stream(messages, tools).await,
        }
    }
}
