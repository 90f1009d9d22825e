//! Data models for price history, news articles and the combined dataset.
//!
//! - [`PriceBar`]: one daily OHLCV row for a ticker
//! - [`DateRange`]: a closed day interval, used for crawl spans and partitions
//! - [`ArticleStub`]: a search hit before full-text resolution
//! - [`ResolvedArticle`]: the resolved title and body of a stub
//! - [`ArticleRecord`]: a persisted corpus row
//! - [`CombinedRow`]: a price bar joined with the news published for it

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single daily OHLCV bar. Unique per `(ticker, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub ticker: String,
    /// Trading date in the exchange's local calendar.
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// A closed day interval: both `start` and `end` are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of days covered, counting both endpoints. Zero for an inverted range.
    pub fn days(&self) -> i64 {
        if self.start > self.end {
            0
        } else {
            (self.end - self.start).num_days() + 1
        }
    }

    /// The first day after the range, used as an exclusive upper bound for upstream queries.
    ///
    /// Saturates at the last representable day.
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end.succ_opt().unwrap_or(self.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A news-search hit, before the article body has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleStub {
    /// The search URL that produced this hit.
    pub query_url: String,
    pub title: String,
    pub published_date: NaiveDateTime,
    pub source_url: String,
}

/// Title and full text returned by the article-resolution endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArticle {
    pub title: String,
    pub body: String,
}

/// A row of the persisted news corpus.
///
/// Records are deduplicated by [`ArticleRecord::key`] when merged into the
/// corpus; exact duplicates from overlapping partitions are expected upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub topic: String,
    pub query_url: String,
    /// Publication time normalized to naive UTC.
    pub published_date: NaiveDateTime,
    pub title: String,
    pub fetched_title: String,
    pub fetched_body: String,
    pub source_url: String,
    /// Plain text of the raw page, filled in by the body backfill run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_text: Option<String>,
}

/// Identity used when merging batches into the corpus.
pub type ArticleKey = (String, NaiveDateTime, String);

impl ArticleRecord {
    pub fn from_resolved(topic: &str, stub: ArticleStub, resolved: ResolvedArticle) -> Self {
        Self {
            topic: topic.to_owned(),
            query_url: stub.query_url,
            published_date: stub.published_date,
            title: stub.title,
            fetched_title: resolved.title,
            fetched_body: resolved.body,
            source_url: stub.source_url,
            page_text: None,
        }
    }

    pub fn key(&self) -> ArticleKey {
        (
            self.topic.clone(),
            self.published_date,
            self.source_url.clone(),
        )
    }

    /// Host of the article's source URL, if it parses.
    pub fn source_host(&self) -> Option<String> {
        url::Url::parse(&self.source_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
    }
}

/// One price bar with the news attributed to its trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub article_count: usize,
    pub headlines: Vec<String>,
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record() -> ArticleRecord {
        ArticleRecord {
            topic: "AAPL".to_string(),
            query_url: "https://news.google.com/rss/search?q=AAPL".to_string(),
            published_date: d("2023-01-03").and_hms_opt(14, 30, 0).unwrap(),
            title: "Apple shares rise".to_string(),
            fetched_title: "Apple shares rise on iPhone demand".to_string(),
            fetched_body: "Body".to_string(),
            source_url: "https://www.reuters.com/markets/apple".to_string(),
            page_text: None,
        }
    }

    #[test]
    fn test_date_range_days_inclusive() {
        assert_eq!(DateRange::new(d("2023-01-01"), d("2023-01-10")).days(), 10);
        assert_eq!(DateRange::new(d("2023-01-01"), d("2023-01-01")).days(), 1);
        assert_eq!(DateRange::new(d("2023-01-02"), d("2023-01-01")).days(), 0);
    }

    #[test]
    fn test_date_range_bounds_and_display() {
        let range = DateRange::new(d("2023-01-01"), d("2023-01-04"));
        assert_eq!(range.end_exclusive(), d("2023-01-05"));
        assert_eq!(range.to_string(), "[2023-01-01, 2023-01-04]");
    }

    #[test]
    fn test_end_exclusive_saturates_at_max_date() {
        let range = DateRange::new(NaiveDate::MAX, NaiveDate::MAX);
        assert_eq!(range.end_exclusive(), NaiveDate::MAX);
        assert_eq!(range.days(), 1);
    }

    #[test]
    fn test_record_key_ignores_titles() {
        let a = record();
        let mut b = record();
        b.fetched_title = "Different".to_string();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_source_host() {
        assert_eq!(record().source_host(), Some("www.reuters.com".to_string()));
        let mut bad = record();
        bad.source_url = "not a url".to_string();
        assert_eq!(bad.source_host(), None);
    }

    #[test]
    fn test_record_without_page_text_deserializes() {
        let json = serde_json::to_string(&record()).unwrap();
        assert!(!json.contains("page_text"));
        let back: ArticleRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.page_text, None);
        assert_eq!(back.published_date, record().published_date);
    }
}
