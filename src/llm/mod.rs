//! LLM integration.
//!
//! Supports:
//! - **OpenAI**: direct API access via rig-core (default)
//! - **Anthropic**: direct API access via rig-core
//!
//! `RigAdapter` bridges rig's `CompletionModel` trait to our `LlmProvider`
//! trait; `RetryingProvider` wraps the result with the retry policy.

pub mod provider;
pub mod retry;
mod rig_adapter;

pub use provider::*;
pub use retry::{RetryPolicy, RetryingProvider};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!("unknown LLM backend '{other}'")),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub retry: RetryPolicy,
    /// Per-call deadline; exceeded calls fail as retryable timeouts.
    pub call_timeout: Option<Duration>,
}

/// Create the retrying LLM provider described by `config`.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let base = match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config)?,
        LlmBackend::OpenAi => create_openai_provider(config)?,
    };
    let mut retrying = RetryingProvider::new(base, config.retry.clone());
    if let Some(timeout) = config.call_timeout {
        retrying = retrying.with_call_timeout(timeout);
    }
    Ok(Arc::new(retrying))
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}
