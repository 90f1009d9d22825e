//! Error taxonomy for the crawl pipeline.
//!
//! Per-article and per-partition failures are absorbed by the components that
//! hit them. Only the whole-pipeline preconditions (price data, configuration,
//! durable storage) propagate up to the entry point.

use crate::models::DateRange;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// Price or search endpoint unreachable or returned an error.
    #[error("upstream {endpoint} unavailable: {reason}")]
    UpstreamUnavailable { endpoint: String, reason: String },

    /// Full-text resolution failed for one article.
    #[error("article {url} unresolvable: {reason}")]
    ArticleUnresolvable { url: String, reason: String },

    #[error("empty price series for {tickers:?} over {window}")]
    EmptyPriceSeries { tickers: Vec<String>, window: String },

    #[error("fetch worker for {range} did not finish within {timeout:?}")]
    WorkerTimeout { range: DateRange, timeout: Duration },

    #[error("malformed upstream payload: {0}")]
    Parse(String),

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CrawlError {
    pub fn upstream(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unresolvable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::ArticleUnresolvable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.as_str().to_owned())
            .unwrap_or_else(|| "unknown".to_owned());
        Self::UpstreamUnavailable {
            endpoint,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_worker_timeout_message_names_range() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 4).unwrap(),
        );
        let err = CrawlError::WorkerTimeout {
            range,
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "fetch worker for [2023-01-01, 2023-01-04] did not finish within 30s"
        );
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CrawlError::storage("/tmp/corpus.json", io);
        assert!(err.to_string().contains("/tmp/corpus.json"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
