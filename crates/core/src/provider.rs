//! Provider trait: the abstraction over LLM completion backends.
//!
//! A Provider takes an assembled list of messages plus the completer
//! parameters of a block set and returns exactly one message.
//!
//! Implementations: OpenAI-compatible endpoints (OpenAI, OpenRouter, Ollama, ...).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::LlmMessage;

/// A single completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// Temperature (0.0 = deterministic, 2.0 = most random)
    pub temperature: f32,

    /// The assembled context, oldest first
    pub messages: Vec<LlmMessage>,

    /// Stop sequence; empty means none
    #[serde(default)]
    pub stop: String,
}

impl CompletionRequest {
    /// The stop sequence, if one was set.
    pub fn stop_sequence(&self) -> Option<&str> {
        if self.stop.is_empty() {
            None
        } else {
            Some(&self.stop)
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated message
    pub message: LlmMessage,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The executor calls `complete()` once per execution without knowing which
/// backend is behind it. Failures carry no partial message.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get the single generated message.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Whether the provider is reachable.
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
