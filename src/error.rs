//! Error types for post-relay.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Messaging platform errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Telegram {method} rejected the request ({code}): {description}")]
    Api {
        method: String,
        code: i64,
        description: String,
    },

    #[error("Rate limited on {method}, retry after {retry_after:?}")]
    RateLimited {
        method: String,
        retry_after: Option<Duration>,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Media of post {post_id} is no longer available")]
    MediaUnavailable { post_id: i64 },
}

/// Text-generation provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed {
        provider: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out")]
    Timeout { provider: String },

    #[error("Provider {provider} rejected the request ({status}): {reason}")]
    InvalidRequest {
        provider: String,
        status: u16,
        reason: String,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Errors surfaced by post lifecycle and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Chat id {chat_id} is outside the platform range")]
    InvalidChatId { chat_id: i64 },

    #[error("No active target channel configured")]
    NoTargetConfigured,

    #[error("Rewriting is disabled: no API key configured")]
    RewriteDisabled,

    #[error("External send failed: {0}")]
    ExternalSendFailure(#[from] ChannelError),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] DatabaseError),

    #[error("Rewrite failed: {0}")]
    Rewrite(#[from] LlmError),
}

impl RelayError {
    pub fn post_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Post", id }
    }

    pub fn channel_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Channel",
            id,
        }
    }

    /// Short notice shown to the operator. Never includes raw error payloads.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound { entity: "Post", .. } => "❌ Post not found",
            Self::NotFound { .. } => "❌ Channel not found",
            Self::InvalidChatId { .. } => "⚠️ Invalid chat id",
            Self::NoTargetConfigured => "🎯 Target channel is not set. Use /set_target first",
            Self::RewriteDisabled => "ANTHROPIC_API_KEY is not set",
            Self::ExternalSendFailure(ChannelError::MediaUnavailable { .. }) => {
                "❌ Post media is no longer available. The post was kept"
            }
            Self::ExternalSendFailure(_) => "❌ Publish failed, try again",
            Self::PersistenceFailure(_) => "❌ Database error, try again",
            Self::Rewrite(_) => "❌ Rewrite failed, try again",
        }
    }
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
