//! # ticker_news
//!
//! Builds a corpus of historical stock prices and related news articles for
//! offline analysis (sentiment-vs-price studies and the like).
//!
//! ## Usage
//!
//! ```sh
//! ticker_news                 # crawl, resuming from the last checkpoint
//! ticker_news backfill        # fetch raw page text for stored articles
//! ticker_news combine         # rebuild the prices + news dataset
//! ```
//!
//! ## Architecture
//!
//! 1. **Prices**: daily bars per ticker establish the crawl's date span
//! 2. **Partitioning**: the span is split into narrow date ranges
//! 3. **Crawling**: one task per range searches and resolves articles
//! 4. **Checkpointing**: every batch is merged into the corpus and persisted
//!
//! Diagnostics go to the configured log file only.

use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod combine;
mod config;
mod coordinator;
mod error;
mod models;
mod outputs;
mod partition;
mod pipeline;
mod prices;
mod retry;
mod scrapers;
mod store;
mod utils;

use cli::{Cli, Command};
use config::CrawlConfig;

const FALLBACK_LOG: &str = "ticker_news.log";

fn init_tracing(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ticker_news=debug"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .try_init()
        .map_err(|e| e as Box<dyn Error>)?;
    Ok(())
}

async fn run(command: Command, config: &CrawlConfig) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Crawl => {
            pipeline::run_crawl(config).await?;
        }
        Command::Backfill => {
            pipeline::run_backfill(config).await?;
        }
        Command::Combine => {
            let rows = pipeline::run_combine(config).await?;
            info!(rows, "Combined dataset written");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    let config = CrawlConfig::load(&args.config);

    let log_path = config
        .as_ref()
        .map(CrawlConfig::log_path)
        .unwrap_or_else(|_| PathBuf::from(FALLBACK_LOG));
    if let Err(e) = init_tracing(&log_path) {
        eprintln!("cannot open log file {}: {e}", log_path.display());
        return ExitCode::FAILURE;
    }

    let start_time = std::time::Instant::now();
    info!(command = ?args.command(), config = %args.config.display(), "ticker_news starting up");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    debug!(?config, "Loaded configuration");

    let outcome = run(args.command(), &config).await;
    let elapsed = start_time.elapsed();
    match outcome {
        Ok(()) => {
            info!(?elapsed, "Execution complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(?elapsed, error = %e, "Run failed");
            ExitCode::FAILURE
        }
    }
}
