//! Stillwater - reports files once they stop changing.
//!
//! This binary watches a directory and prints one line per file each time
//! that file settles, together with its current line count.
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options. Command
//! line arguments take precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use stillwater_monitor::config::Config;
use stillwater_monitor::filter::ExtensionFilter;
use stillwater_monitor::session::WatchSession;
use stillwater_monitor::types::SettledEvent;

/// Capacity of the settlement channel between the scheduler and the printer.
const REPORT_BUFFER_SIZE: usize = 1024;

/// Stillwater - reports files once they stop changing.
///
/// Watches a directory tree and prints each matching file after it has been
/// quiet for the quiescence window.
#[derive(Parser, Debug)]
#[command(name = "stillwater")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    STILLWATER_ROOT            Directory to watch (default: .)
    STILLWATER_FILTER          File-name glob (default: *)
    STILLWATER_TICK_MS         Flush tick interval (default: 10000)
    STILLWATER_QUIESCENCE_MS   Quiet time before settling (default: 50)
    STILLWATER_RECURSIVE       Watch subdirectories (default: true)
    RUST_LOG                   Log filter (default: info)

EXAMPLES:
    # Report every .log file under /var/log/app
    stillwater /var/log/app '*.log'

    # Faster ticks, JSON output
    stillwater . '*.csv' --tick-ms 500 --json
")]
struct Cli {
    /// Directory to watch.
    root: Option<PathBuf>,

    /// File-name filter, e.g. "*.log".
    filter: Option<String>,

    /// Flush tick interval in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Quiet time in milliseconds before a file counts as settled.
    #[arg(long)]
    quiescence_ms: Option<u64>,

    /// Only watch the top-level directory.
    #[arg(long)]
    no_recursive: bool,

    /// Print one JSON object per settled file.
    #[arg(long)]
    json: bool,
}

/// One printed report.
#[derive(Debug, Serialize)]
struct Report<'a> {
    path: &'a Path,
    lines: usize,
    settled_at: DateTime<Utc>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run_monitor(cli))
}

/// Runs the watcher until Ctrl+C or SIGTERM.
async fn run_monitor(cli: Cli) -> Result<()> {
    init_logging();

    let config = load_config(&cli)?;

    info!(
        root = %config.root.display(),
        filter = %config.filter,
        tick_ms = config.tick_interval.as_millis(),
        quiescence_ms = config.quiescence_window.as_millis(),
        recursive = config.recursive,
        "Configuration loaded"
    );

    let (report_tx, mut report_rx) = mpsc::channel::<SettledEvent>(REPORT_BUFFER_SIZE);

    let session = WatchSession::from_config(&config, report_tx)
        .context("Invalid watch configuration")?;
    session.start().context(format!(
        "Failed to start watching {}",
        config.root.display()
    ))?;

    info!("Watching. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            Some(event) = report_rx.recv() => {
                report(&event, cli.json).await;
            }
        }
    }

    session.stop().await;

    info!("Monitor stopped");
    Ok(())
}

/// Builds the configuration from the environment, then applies CLI overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env().context("Failed to load configuration")?;

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(filter) = &cli.filter {
        config.filter = ExtensionFilter::parse(filter).context("Invalid filter argument")?;
    }
    if let Some(ms) = cli.tick_ms {
        config.tick_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.quiescence_ms {
        config.quiescence_window = Duration::from_millis(ms);
    }
    if cli.no_recursive {
        config.recursive = false;
    }

    Ok(config)
}

/// Prints one settled file with its line count.
async fn report(event: &SettledEvent, json: bool) {
    let lines = match count_lines(&event.path).await {
        Ok(lines) => lines,
        Err(e) => {
            warn!(
                path = %event.path.display(),
                error = %e,
                "Settled file could not be read, skipping"
            );
            return;
        }
    };

    debug!(path = %event.path.display(), lines, "Reporting settled file");

    if json {
        let report = Report {
            path: &event.path,
            lines,
            settled_at: event.settled_at,
        };
        match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to serialize report"),
        }
    } else {
        println!("{}: {} lines", event.path.display(), lines);
    }
}

/// Counts newline-separated lines; a trailing partial line counts as one.
async fn count_lines(path: &Path) -> std::io::Result<usize> {
    let file = File::open(path).await?;
    let mut segments = BufReader::new(file).split(b'\n');

    let mut count = 0;
    while segments.next_segment().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

/// Initializes the logging subsystem.
///
/// Logs go to stderr so stdout carries only reports.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
