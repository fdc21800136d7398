//! Retry decorator for LLM providers.
//!
//! Every completion in the pipeline goes through `RetryingProvider`, so the
//! retry policy lives in one place instead of at each call site.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the delay after the given failed attempt (1-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Jittered delay in `[base_delay, ceiling]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        let floor = self.base_delay.min(ceiling);
        let (lo, hi) = (floor.as_millis() as u64, ceiling.as_millis() as u64);
        if hi <= lo {
            return ceiling;
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    pub fn should_retry(&self, error: &LlmError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }
}

/// Wraps a provider with a retry policy and an optional per-call timeout.
///
/// A call that exceeds the timeout fails with the retryable
/// [`LlmError::Timeout`].
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    call_timeout: Option<Duration>,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    async fn attempt(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.complete(request))
                .await
                .unwrap_or_else(|_| {
                    Err(LlmError::Timeout {
                        provider: self.inner.model_name().to_string(),
                        timeout: limit,
                    })
                }),
            None => self.inner.complete(request).await,
        }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 1;
        loop {
            match self.attempt(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if self.policy.should_retry(&e, attempt) => {
                    let mut delay = self.policy.delay_for(attempt);
                    if let LlmError::RateLimited {
                        retry_after: Some(hint),
                        ..
                    } = &e
                    {
                        delay = delay.max(*hint).min(self.policy.max_delay);
                    }
                    warn!(
                        model = %self.inner.model_name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::llm::provider::ChatMessage;

    /// Replays a scripted sequence of outcomes.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<CompletionResponse, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionResponse::text("done")))
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn transient() -> LlmError {
        LlmError::RequestFailed {
            provider: "scripted".into(),
            reason: "connection reset".into(),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff_ceiling(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_secs(8));
        assert_eq!(policy.backoff_ceiling(10), Duration::from_secs(60));
        assert_eq!(policy.backoff_ceiling(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn jittered_delay_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..8 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= policy.base_delay);
            assert!(delay <= policy.backoff_ceiling(attempt));
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let inner = Scripted::new(vec![Err(transient()), Err(transient())]);
        let provider = RetryingProvider::new(inner.clone(), fast_policy(3));

        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.content, "done");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let inner = Scripted::new(vec![Err(transient()), Err(transient()), Err(transient())]);
        let provider = RetryingProvider::new(inner.clone(), fast_policy(3));

        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let inner = Scripted::new(vec![Err(LlmError::InvalidRequest {
            provider: "scripted".into(),
            reason: "malformed".into(),
        })]);
        let provider = RetryingProvider::new(inner.clone(), fast_policy(3));

        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest { .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    struct Slow;

    #[async_trait]
    impl LlmProvider for Slow {
        fn model_name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CompletionResponse::text("late"))
        }
    }

    #[tokio::test]
    async fn call_timeout_surfaces_as_timeout_error() {
        let provider = RetryingProvider::new(Arc::new(Slow), fast_policy(2))
            .with_call_timeout(Duration::from_millis(10));

        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }
}
