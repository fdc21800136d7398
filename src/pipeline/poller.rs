//! Poll loop: list new mail, label it, tag it back, advance the watermark.
//!
//! Each iteration:
//! 1. `MailProvider::list_new(watermark)`
//! 2. Label + tag every message; failures are logged per message and never
//!    abort the batch
//! 3. Watermark := now, whatever the per-message outcomes
//! 4. Sleep for the cooldown

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{MailError, PipelineError};
use crate::mail::cache::dump_messages;
use crate::mail::message::Message;
use crate::mail::provider::MailProvider;
use crate::pipeline::labeler::{LabelStage, Labeler};

/// Source of "now" in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Poll loop parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Sleep between iterations.
    pub cooldown: Duration,
    /// How far back the first iteration looks when no watermark is given.
    pub lookback: Duration,
    /// Messages labeled concurrently within one iteration.
    pub max_concurrency: usize,
    /// Dump each listed batch here as JSON, if set.
    pub cache_path: Option<PathBuf>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            lookback: Duration::from_secs(24 * 60 * 60),
            max_concurrency: 1,
            cache_path: None,
        }
    }
}

/// Outcome of one poll iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub listed: usize,
    pub tagged: usize,
    pub failed: usize,
    /// Watermark after the iteration.
    pub watermark: i64,
}

/// Why a single message was not tagged.
#[derive(Debug, thiserror::Error)]
enum MessageFailure {
    #[error(transparent)]
    Label(#[from] PipelineError),

    #[error("tagging with {label} failed: {source}")]
    Tag {
        label: String,
        #[source]
        source: MailError,
    },
}

impl MessageFailure {
    fn stage(&self) -> &'static str {
        match self {
            Self::Label(e) => e.stage().as_str(),
            Self::Tag { .. } => "tag",
        }
    }
}

/// Owns the watermark and drives messages from the provider through the labeler.
pub struct Poller {
    mail: Arc<dyn MailProvider>,
    labeler: Arc<Labeler>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    watermark: i64,
}

impl Poller {
    /// Start with watermark = now − lookback.
    pub fn new(
        mail: Arc<dyn MailProvider>,
        labeler: Arc<Labeler>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        let lookback = i64::try_from(config.lookback.as_secs()).unwrap_or(i64::MAX);
        let watermark = clock.now().saturating_sub(lookback);
        Self {
            mail,
            labeler,
            clock,
            config,
            watermark,
        }
    }

    /// Resume from a known watermark instead of the lookback default.
    pub fn with_watermark(mut self, watermark: i64) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    /// Run one iteration.
    pub async fn run_once(&mut self) -> IterationReport {
        let mut report = IterationReport {
            watermark: self.watermark,
            ..Default::default()
        };

        let messages = match self.mail.list_new(self.watermark).await {
            Ok(messages) => messages,
            Err(e) => {
                // Keep the watermark so the next iteration re-lists this window.
                error!(
                    provider = %self.mail.name(),
                    watermark = self.watermark,
                    error = %e,
                    "Failed to list new messages"
                );
                return report;
            }
        };
        report.listed = messages.len();

        if messages.is_empty() {
            debug!(watermark = self.watermark, "No new messages");
        } else {
            info!(count = messages.len(), watermark = self.watermark, "Processing new messages");
            if let Some(ref path) = self.config.cache_path {
                if let Err(e) = dump_messages(path, &messages).await {
                    warn!(path = %path.display(), error = %e, "Failed to dump message cache");
                }
            }
        }

        let mail = &self.mail;
        let labeler = &self.labeler;
        let outcomes: Vec<bool> = futures::stream::iter(messages)
            .map(|message| async move { process_message(mail.as_ref(), labeler, message).await })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        report.tagged = outcomes.iter().filter(|ok| **ok).count();
        report.failed = outcomes.len() - report.tagged;

        self.watermark = self.watermark.max(self.clock.now());
        report.watermark = self.watermark;

        info!(
            listed = report.listed,
            tagged = report.tagged,
            failed = report.failed,
            watermark = report.watermark,
            "Poll iteration complete"
        );
        report
    }

    /// Poll until `shutdown` is set.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) {
        info!(
            provider = %self.mail.name(),
            cooldown_secs = self.config.cooldown.as_secs(),
            watermark = self.watermark,
            "Poller started"
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            self.run_once().await;
            if !sleep_unless_shutdown(self.config.cooldown, &shutdown).await {
                break;
            }
        }

        info!(watermark = self.watermark, "Poller shutting down");
    }

    /// Spawn the loop as a background task.
    ///
    /// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
    pub fn spawn(self) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = tokio::spawn(self.run(shutdown));
        (handle, flag)
    }
}

/// Label and tag one message. Returns whether it was tagged.
async fn process_message(mail: &dyn MailProvider, labeler: &Labeler, mut message: Message) -> bool {
    match label_and_tag(mail, labeler, &mut message).await {
        Ok(label) => {
            info!(id = %message.id, label = %label, "Message tagged");
            true
        }
        Err(e) => {
            error!(
                id = %message.id,
                subject = %message.subject,
                stage = e.stage(),
                final_stage = %LabelStage::Failed,
                error = %e,
                "Failed to label message"
            );
            false
        }
    }
}

async fn label_and_tag(
    mail: &dyn MailProvider,
    labeler: &Labeler,
    message: &mut Message,
) -> Result<String, MessageFailure> {
    let label = labeler.label(message).await?;
    mail.tag(&message.id, &label)
        .await
        .map_err(|source| MessageFailure::Tag {
            label: label.clone(),
            source,
        })?;
    Ok(label)
}

/// Sleep for `duration`, waking early if shutdown is requested.
/// Returns `false` when shutdown was requested.
async fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    const SLICE: Duration = Duration::from_millis(250);
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(SLICE)).await;
    }
}
