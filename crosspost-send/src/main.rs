//! crosspost-send - Background daemon for scheduled posting
//!
//! Polls the post store and publishes every due post to its target
//! platforms, retrying failures on later polls.

use clap::Parser;
use libcrosspost::logging;
use libcrosspost::rate_limiter::RateLimiter;
use libcrosspost::{
    AdapterRegistry, Config, CrosspostError, Database, Dispatcher, Result,
    ScheduledPostProcessor, SqliteCredentialResolver,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Rate limit windows older than this are dropped at startup
const RATE_LIMIT_RETENTION_SECS: i64 = 24 * 3600;

#[derive(Parser, Debug)]
#[command(name = "crosspost-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
crosspost-send - Background daemon for scheduled posting

DESCRIPTION:
    crosspost-send is a long-running daemon that publishes scheduled posts
    to Facebook, Instagram, YouTube, Twitter, Mastodon and Telegram.

    It polls the database at regular intervals, publishes every post that
    is due to all of its platforms at once, and records the result. Posts
    that fail on every platform are retried on later polls, up to the
    configured maximum.

USAGE:
    # Run in foreground (logs to stderr)
    crosspost-send

    # Run with custom poll interval
    crosspost-send --poll-interval 30

    # Process due posts once and exit
    crosspost-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current poll)

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml (or $CROSSPOST_CONFIG)

    [database]
    path = \"~/.local/share/crosspost/posts.db\"

    [scheduler]
    poll_interval_secs = 10
    max_retries = 3
    call_timeout_secs = 30

    [rate_limits]
    twitter = 50  # posts per hour

LOGGING:
    CROSSPOST_LOG_FORMAT - text, json or pretty (default: text)
    CROSSPOST_LOG_LEVEL  - error, warn, info, debug, trace (default: info)

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
    3 - Invalid input
")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "PATH", env = "CROSSPOST_CONFIG")]
    config: Option<PathBuf>,

    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process due posts once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::config_from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(secs) = cli.poll_interval {
        config.scheduler.poll_interval_secs = secs;
        config.scheduler.validate()?;
    }

    let db = Database::new(&config.database.path).await?;
    let processor = build_processor(&config, &db).await?;

    info!(
        poll_interval_secs = config.scheduler.poll_interval_secs,
        max_retries = config.scheduler.max_retries,
        "crosspost-send starting"
    );

    let result = if cli.once {
        processor.run_once().await.and_then(|report| {
            info!(?report, "Processed due posts once, exiting");
            if report.errors > 0 {
                Err(CrosspostError::Lifecycle(format!(
                    "{} post(s) could not be processed",
                    report.errors
                )))
            } else {
                Ok(())
            }
        })
    } else {
        run_daemon(processor).await
    };

    db.close().await;
    info!("crosspost-send stopped");
    result
}

async fn build_processor(config: &Config, db: &Database) -> Result<ScheduledPostProcessor> {
    let registry = AdapterRegistry::from_config(config)?;
    let resolver = Arc::new(SqliteCredentialResolver::new(db.clone()));
    let mut dispatcher =
        Dispatcher::new(registry, resolver).with_call_timeout(config.scheduler.call_timeout());

    let limits = config.rate_limits();
    if !limits.is_empty() {
        let limiter = RateLimiter::new(db.clone(), limits);
        let cutoff = chrono::Utc::now().timestamp() - RATE_LIMIT_RETENTION_SECS;
        if let Err(e) = limiter.cleanup_old_windows(cutoff).await {
            warn!(error = %e, "Failed to clean up old rate limit windows");
        }
        dispatcher = dispatcher.with_rate_limiter(limiter);
    }

    Ok(ScheduledPostProcessor::new(
        Arc::new(db.clone()),
        Arc::new(dispatcher),
        &config.scheduler,
    ))
}

async fn run_daemon(mut processor: ScheduledPostProcessor) -> Result<()> {
    let shutdown = Arc::new(Notify::new());
    setup_signal_handlers(shutdown.clone())?;

    processor.start()?;
    shutdown.notified().await;

    info!("Shutdown requested, waiting for the current poll to finish");
    processor.stop().await;
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<Notify>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| CrosspostError::Lifecycle(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "Received shutdown signal, stopping gracefully...");
            // notify_one stores a permit if nobody is waiting yet
            shutdown.notify_one();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<Notify>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            shutdown.notify_one();
        }
    });
    Ok(())
}
