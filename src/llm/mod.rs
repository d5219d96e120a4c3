//! Text generation for post rewriting.
//!
//! Supports:
//! - **Anthropic**: via rig-core, with exponential-backoff retry around each call
//!
//! Callers depend on the `TextGenerator` trait so tests can swap in a stub.

pub mod anthropic;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use retry::{RetryPolicy, is_retryable, with_retry};

use async_trait::async_trait;

use crate::error::LlmError;

/// A single-turn generation request: system prompt plus one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
    pub max_tokens: u32,
}

/// Something that turns a prompt and text into new text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text. Transient failures are retried inside; the error is terminal.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}
