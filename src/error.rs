//! Error types for the inbox labeler.

use std::time::Duration;

use crate::pipeline::labeler::LabelStage;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Payload decoding errors. Fatal for the message being decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64url body: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to decode message {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: DecodeError,
    },

    #[error("Label {label} is not a recognized mailbox tag")]
    UnknownLabel { label: String },

    #[error("Mail request failed: {0}")]
    Request(String),

    #[error("Unexpected response from mail provider: {0}")]
    InvalidResponse(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} rejected the request: {reason}")]
    InvalidRequest { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

impl LlmError {
    /// Whether the failure is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }
}

/// Labeling pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No ###label### found in completion: {response:?}")]
    NoLabelMatch { response: String },

    #[error("Completion failed during {stage}: {source}")]
    Completion {
        stage: LabelStage,
        #[source]
        source: LlmError,
    },

    #[error("Summarization produced no text")]
    EmptySummary,
}

impl PipelineError {
    /// Last labeler stage reached before the failure.
    pub fn stage(&self) -> LabelStage {
        match self {
            Self::NoLabelMatch { .. } => LabelStage::Prompted,
            Self::Completion { stage, .. } => *stage,
            Self::EmptySummary => LabelStage::NeedsSummarization,
        }
    }
}
