//! Run configuration loaded from a YAML file.
//!
//! A single [`CrawlConfig`] is built per run and handed to every component at
//! construction time. Every field has a default, so a missing file or a
//! partial file is valid.

use crate::error::CrawlError;
use crate::partition::PartitionStrategy;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Price history window requested from the upstream price endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceWindow {
    /// Explicit window, both dates included.
    Range { start: NaiveDate, end: NaiveDate },
    /// Period relative to today, in the endpoint's notation (`1mo`, `1y`, `5y`, `max`).
    Period { period: String },
}

impl Default for PriceWindow {
    fn default() -> Self {
        PriceWindow::Period {
            period: "1y".to_string(),
        }
    }
}

impl std::fmt::Display for PriceWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceWindow::Range { start, end } => write!(f, "{start}..={end}"),
            PriceWindow::Period { period } => write!(f, "period {period}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub tickers: Vec<String>,
    /// Search topics; empty means "use the tickers".
    pub topics: Vec<String>,
    pub price_window: PriceWindow,

    pub data_dir: PathBuf,
    pub corpus_file: String,
    pub prices_file: String,
    pub combined_file: String,
    pub log_file: String,

    pub partition: PartitionStrategy,
    /// Partitions crawled between two checkpoints.
    pub batch_size: usize,
    pub max_results: usize,
    pub language: String,
    pub country: String,

    pub worker_timeout_secs: u64,
    pub run_deadline_secs: Option<u64>,
    pub request_timeout_secs: u64,

    pub backfill_concurrency: usize,
    pub backfill_batch_size: usize,
    pub price_retries: usize,

    pub search_base_url: String,
    pub price_base_url: String,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            tickers: vec!["AAPL".to_string(), "MSFT".to_string(), "TSLA".to_string()],
            topics: Vec::new(),
            price_window: PriceWindow::default(),
            data_dir: PathBuf::from("data"),
            corpus_file: "news_corpus.json".to_string(),
            prices_file: "prices.json".to_string(),
            combined_file: "combined.json".to_string(),
            log_file: "ticker_news.log".to_string(),
            partition: PartitionStrategy::default(),
            batch_size: 4,
            max_results: 100,
            language: "en".to_string(),
            country: "US".to_string(),
            worker_timeout_secs: 300,
            run_deadline_secs: None,
            request_timeout_secs: 30,
            backfill_concurrency: 16,
            backfill_batch_size: 200,
            price_retries: 3,
            search_base_url: "https://news.google.com".to_string(),
            price_base_url: "https://query1.finance.yahoo.com".to_string(),
            user_agent: format!("ticker_news/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CrawlConfig {
    /// Load and validate the configuration at `path`.
    ///
    /// A missing file yields the defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, CrawlError> {
        let config = match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_yaml(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration file; using defaults");
                Self::default()
            }
            Err(e) => return Err(CrawlError::storage(path, e)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, CrawlError> {
        serde_yaml::from_str(raw).map_err(|e| CrawlError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.tickers.iter().all(|t| t.trim().is_empty()) {
            return Err(CrawlError::Config("at least one ticker is required".into()));
        }
        if self.max_results == 0 {
            return Err(CrawlError::Config("max_results must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(CrawlError::Config("batch_size must be positive".into()));
        }
        if self.backfill_concurrency == 0 || self.backfill_batch_size == 0 {
            return Err(CrawlError::Config(
                "backfill_concurrency and backfill_batch_size must be positive".into(),
            ));
        }
        if let PriceWindow::Range { start, end } = &self.price_window {
            if start > end {
                return Err(CrawlError::Config(format!(
                    "price_window start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }

    pub fn topics(&self) -> Vec<String> {
        let source = if self.topics.is_empty() {
            &self.tickers
        } else {
            &self.topics
        };
        source
            .iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.data_dir.join(&self.corpus_file)
    }

    pub fn prices_path(&self) -> PathBuf {
        self.data_dir.join(&self.prices_file)
    }

    pub fn combined_path(&self) -> PathBuf {
        self.data_dir.join(&self.combined_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}
