//! Configuration types.
//!
//! Everything is read from environment variables with typed defaults. Only
//! the API key for the selected backend and the Gmail access token are
//! required.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig, RetryPolicy};
use crate::pipeline::labels::{DEFAULT_UNKNOWN_LABEL, LabelSet};
use crate::pipeline::{LabelerConfig, PollerConfig, SummarizerConfig};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub gmail_access_token: SecretString,
    pub labels: LabelSet,
    pub labeler: LabelerConfig,
    pub summarizer: SummarizerConfig,
    pub poller: PollerConfig,
    /// Write daily rolling log files here in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let backend = vars.parse_or("LABELER_LLM_BACKEND", LlmBackend::OpenAi)?;
        let (key_var, default_model) = match backend {
            LlmBackend::OpenAi => ("OPENAI_API_KEY", DEFAULT_OPENAI_MODEL),
            LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", DEFAULT_ANTHROPIC_MODEL),
        };
        let api_key = vars.required(key_var)?;
        let model = vars
            .get("LABELER_MODEL")
            .unwrap_or_else(|| default_model.to_string());

        let retry = RetryPolicy {
            max_attempts: vars.parse_or("LABELER_RETRY_ATTEMPTS", 3u32)?,
            base_delay: Duration::from_millis(vars.parse_or("LABELER_RETRY_BASE_MS", 1000u64)?),
            max_delay: Duration::from_millis(vars.parse_or("LABELER_RETRY_MAX_MS", 60_000u64)?),
        };
        if retry.max_attempts == 0 {
            return Err(invalid("LABELER_RETRY_ATTEMPTS", "must be at least 1"));
        }

        // 0 disables the per-call deadline.
        let call_timeout = match vars.parse_or("LABELER_CALL_TIMEOUT_SECS", 60u64)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model,
            retry,
            call_timeout,
        };

        let gmail_access_token = SecretString::from(vars.required("GMAIL_ACCESS_TOKEN")?);

        let unknown = vars
            .get("LABELER_UNKNOWN_LABEL")
            .unwrap_or_else(|| DEFAULT_UNKNOWN_LABEL.to_string());
        let labels = match vars.get("LABELER_LABELS") {
            Some(csv) => LabelSet::from_csv(&csv, unknown),
            None => LabelSet::new(LabelSet::default().labels(), unknown),
        };
        if labels.is_empty() {
            return Err(invalid("LABELER_LABELS", "no labels given"));
        }

        let labeler = LabelerConfig {
            token_budget: vars.parse_or("LABELER_TOKEN_BUDGET", 4000usize)?,
            ..LabelerConfig::default()
        };

        let summarizer = SummarizerConfig {
            chunk_chars: vars.parse_or("LABELER_CHUNK_CHARS", 4000usize)?,
            chunk_overlap: vars.parse_or("LABELER_CHUNK_OVERLAP", 100usize)?,
            temperature: vars.parse_or("LABELER_SUMMARY_TEMPERATURE", 0.0f32)?,
            max_tokens: vars.parse_or("LABELER_SUMMARY_MAX_TOKENS", 512u32)?,
        };
        if summarizer.chunk_chars == 0 {
            return Err(invalid("LABELER_CHUNK_CHARS", "must be positive"));
        }
        if summarizer.chunk_overlap >= summarizer.chunk_chars {
            return Err(invalid(
                "LABELER_CHUNK_OVERLAP",
                "must be smaller than LABELER_CHUNK_CHARS",
            ));
        }

        let poller = PollerConfig {
            cooldown: Duration::from_secs(vars.parse_or("LABELER_POLL_SECS", 60u64)?),
            lookback: Duration::from_secs(vars.parse_or("LABELER_LOOKBACK_SECS", 24 * 60 * 60u64)?),
            max_concurrency: vars.parse_or("LABELER_CONCURRENCY", 1usize)?.max(1),
            cache_path: vars.get("LABELER_CACHE_PATH").map(PathBuf::from),
        };

        Ok(Self {
            llm,
            gmail_access_token,
            labels,
            labeler,
            summarizer,
            poller,
            log_dir: vars.get("LOG_DIR").map(PathBuf::from),
        })
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Typed access to a variable lookup. Blank values count as unset.
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| invalid(key, format!("'{raw}': {e}"))),
            None => Ok(default),
        }
    }
}
