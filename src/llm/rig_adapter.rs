//! Bridges rig-core completion models to the `LlmProvider` trait.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rig::completion::{AssistantContent, CompletionError, CompletionModel};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider, Role};

// Status codes only count as whole numbers, never as digits inside a larger one.
static RATE_LIMITED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b429\b|rate limit|overloaded").unwrap());
static AUTH_FAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b401\b|invalid api key|unauthorized").unwrap());
static TRANSIENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b5\d\d\b|timeout|timed out|temporarily").unwrap());

/// `LlmProvider` backed by any rig-core `CompletionModel`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = user_prompt(&request);
        let mut builder = self.model.completion_request(prompt);
        if let Some(system) = request.system_prompt() {
            builder = builder.preamble(system);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_completion_error(&self.model_name, e))?;

        let content = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens.try_into().unwrap_or(u32::MAX),
            output_tokens: response.usage.output_tokens.try_into().unwrap_or(u32::MAX),
        })
    }
}

/// Non-system messages flattened into the single prompt rig sends as the user turn.
fn user_prompt(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Sort rig errors into retryable and fatal classes.
fn map_completion_error(provider: &str, error: CompletionError) -> LlmError {
    let provider = provider.to_string();
    match error {
        CompletionError::HttpError(e) => LlmError::RequestFailed {
            provider,
            reason: e.to_string(),
        },
        CompletionError::ProviderError(msg) => classify_provider_message(provider, msg),
        other => LlmError::InvalidResponse {
            provider,
            reason: other.to_string(),
        },
    }
}

fn classify_provider_message(provider: String, msg: String) -> LlmError {
    if RATE_LIMITED.is_match(&msg) {
        LlmError::RateLimited {
            provider,
            retry_after: None,
        }
    } else if AUTH_FAILED.is_match(&msg) {
        LlmError::AuthFailed { provider }
    } else if TRANSIENT.is_match(&msg) {
        LlmError::RequestFailed {
            provider,
            reason: msg,
        }
    } else {
        LlmError::InvalidRequest {
            provider,
            reason: msg,
        }
    }
}
