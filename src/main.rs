use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use inbox_labeler::config::AppConfig;
use inbox_labeler::llm::create_provider;
use inbox_labeler::mail::{GmailProvider, MailProvider};
use inbox_labeler::pipeline::{
    Cl100kEstimator, Labeler, Poller, Summarizer, SystemClock, TokenEstimator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📬 Inbox Labeler v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!(
        "   Labels: {} (fallback '{}')",
        config.labels.labels().join(", "),
        config.labels.unknown()
    );
    eprintln!(
        "   Poll every {}s, token budget {}",
        config.poller.cooldown.as_secs(),
        config.labeler.token_budget
    );
    if let Some(ref path) = config.poller.cache_path {
        eprintln!("   Cache: {}", path.display());
    }

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)
        .context("failed to create LLM provider")?;
    let tokens: Arc<dyn TokenEstimator> =
        Arc::new(Cl100kEstimator::new().context("failed to load cl100k_base encoding")?);

    // ── Labeler ──────────────────────────────────────────────────────────
    let summarizer = Summarizer::new(Arc::clone(&llm), config.summarizer.clone());
    let labeler = Arc::new(Labeler::new(
        llm,
        tokens,
        summarizer,
        config.labels.clone(),
        config.labeler.clone(),
    ));

    // ── Mail ─────────────────────────────────────────────────────────────
    let mail: Arc<dyn MailProvider> =
        Arc::new(GmailProvider::new(config.gmail_access_token.clone()));

    // ── Poll loop ────────────────────────────────────────────────────────
    let poller = Poller::new(mail, labeler, Arc::new(SystemClock), config.poller.clone());
    let (handle, shutdown) = poller.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Ctrl-C received, stopping after the current iteration");
    shutdown.store(true, Ordering::Relaxed);

    handle.await.context("poller task panicked")?;
    Ok(())
}

/// stderr logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-labeler.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr.and(file_writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}
