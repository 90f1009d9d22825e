//! Command-line interface definitions.
//!
//! Running the bare command resumes the crawl from the last checkpoint; all
//! other settings live in the YAML configuration file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for ticker_news.
///
/// # Examples
///
/// ```sh
/// # Crawl (or resume crawling) with ./ticker_news.yaml
/// ticker_news
///
/// # Fetch raw page text for articles that lack it
/// ticker_news --config research.yaml backfill
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "TICKER_NEWS_CONFIG", default_value = "ticker_news.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Load prices, crawl news from the last checkpoint and rebuild the combined dataset
    Crawl,
    /// Fetch raw page text for corpus records that do not have it yet
    Backfill,
    /// Rebuild the combined dataset from the persisted prices and corpus
    Combine,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Crawl)
    }
}
