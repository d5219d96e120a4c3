//! Anthropic text generation through rig-core.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{AssistantContent, CompletionError, CompletionModel};
use rig::providers::anthropic;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::retry::{RetryPolicy, with_retry};
use crate::llm::{GenerationRequest, TextGenerator};

const PROVIDER: &str = "anthropic";

/// Anthropic client with built-in retry. The model is picked per request.
pub struct AnthropicClient {
    client: rig::client::Client<anthropic::client::AnthropicExt>,
    policy: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(api_key: SecretString, base_url: &str) -> Result<Self, LlmError> {
        let client: rig::client::Client<anthropic::client::AnthropicExt> =
            anthropic::Client::builder()
                .api_key(api_key.expose_secret())
                .base_url(base_url.trim_end_matches('/'))
                .build()
                .map_err(|e| LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    status: None,
                    reason: format!("Failed to create Anthropic client: {e}"),
                })?;

        Ok(Self {
            client,
            policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn send_once(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let model = self.client.completion_model(&request.model);
        let response = model
            .completion_request(request.user_text.as_str())
            .preamble(request.system_prompt.clone())
            .max_tokens(u64::from(request.max_tokens))
            .send()
            .await
            .map_err(completion_error)?;

        debug!(
            model = %request.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Generation complete"
        );
        join_text(response.choice.iter())
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        with_retry(&self.policy, move || self.send_once(request)).await
    }
}

/// Join every text block of a response.
fn join_text<'a>(content: impl Iterator<Item = &'a AssistantContent>) -> Result<String, LlmError> {
    let mut blocks = content
        .filter_map(|c| match c {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .peekable();

    if blocks.peek().is_none() {
        return Err(LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "response has no text content".to_string(),
        });
    }
    Ok(blocks.collect::<String>().trim().to_string())
}

fn completion_error(err: CompletionError) -> LlmError {
    match err {
        CompletionError::ProviderError(body) => provider_error(&body),
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason,
        },
        CompletionError::JsonError(e) => LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        },
        other => transport_error(&other.to_string()),
    }
}

fn transport_error(reason: &str) -> LlmError {
    let lower = reason.to_ascii_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        LlmError::Timeout {
            provider: PROVIDER.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            status: None,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Classify an API error body by its `error.type`.
fn provider_error(body: &str) -> LlmError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        // Gateways answer with HTML or plain text; treat as transient.
        return LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            status: None,
            reason: body.chars().take(200).collect(),
        };
    };
    let ErrorBody { kind, message } = envelope.error;
    let failed = |status: u16, reason: String| LlmError::RequestFailed {
        provider: PROVIDER.to_string(),
        status: Some(status),
        reason,
    };
    let rejected = |status: u16, reason: String| LlmError::InvalidRequest {
        provider: PROVIDER.to_string(),
        status,
        reason,
    };

    match kind.as_str() {
        "authentication_error" | "permission_error" => LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        },
        "rate_limit_error" => LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after: None,
        },
        "timeout_error" => LlmError::Timeout {
            provider: PROVIDER.to_string(),
        },
        "overloaded_error" => failed(529, message),
        "api_error" => failed(500, message),
        "not_found_error" => rejected(404, message),
        "request_too_large" => rejected(413, message),
        _ => rejected(400, message),
    }
}
