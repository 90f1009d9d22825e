//! Google News RSS search.
//!
//! The search endpoint takes a free-text query, a language/country edition and
//! `after:`/`before:` operators restricting the publication date. It returns
//! an RSS feed capped at roughly a hundred items regardless of the window,
//! which is why crawl spans are partitioned before searching.
//!
//! # URL Pattern
//!
//! ```text
//! {base}/rss/search?q=AAPL+after:2023-01-01+before:2023-01-05&hl=en-US&gl=US&ceid=US:en
//! ```
//!
//! `after:` is inclusive of the given day and `before:` exclusive, so a closed
//! [`DateRange`] maps to `after:start before:end+1`.

use super::NewsSearch;
use crate::error::CrawlError;
use crate::models::{ArticleStub, DateRange};
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

#[derive(Debug, Clone)]
pub struct GoogleNewsSearch {
    client: Client,
    base_url: String,
    language: String,
    country: String,
}

impl GoogleNewsSearch {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        language: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            language: language.into(),
            country: country.into(),
        }
    }

    /// Build the search URL for `topic` over `range`.
    pub fn query_url(&self, topic: &str, range: DateRange) -> Result<Url, CrawlError> {
        let mut url = Url::parse(&self.base_url)
            .and_then(|base| base.join("rss/search"))
            .map_err(|e| CrawlError::Config(format!("invalid search_base_url: {e}")))?;
        let query = format!(
            "{topic} after:{} before:{}",
            range.start.format("%Y-%m-%d"),
            range.end_exclusive().format("%Y-%m-%d")
        );
        url.query_pairs_mut()
            .append_pair("q", &query)
            .append_pair("hl", &format!("{}-{}", self.language, self.country))
            .append_pair("gl", &self.country)
            .append_pair("ceid", &format!("{}:{}", self.country, self.language));
        Ok(url)
    }
}

impl NewsSearch for GoogleNewsSearch {
    #[instrument(level = "info", skip(self), fields(%range))]
    async fn search(
        &self,
        topic: &str,
        range: DateRange,
        max_results: usize,
    ) -> Result<Vec<ArticleStub>, CrawlError> {
        let url = self.query_url(topic, range)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;

        let mut stubs = parse_feed(&body, url.as_str())?;
        stubs.truncate(max_results);
        info!(count = stubs.len(), "Searched news");
        Ok(stubs)
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(rename = "pubDate", default)]
    pub_date: String,
}

/// Parse an RSS search feed into stubs.
///
/// # Arguments
///
/// * `xml` - The feed document
/// * `query_url` - Search URL recorded on every stub
///
/// # Returns
///
/// Stubs in feed order with publication times normalized to UTC. Items without
/// a link or a parseable `pubDate` are skipped.
///
/// # Errors
///
/// [`CrawlError::Parse`] if the document is not an RSS feed.
pub fn parse_feed(xml: &str, query_url: &str) -> Result<Vec<ArticleStub>, CrawlError> {
    let rss: Rss = quick_xml::de::from_str(xml).map_err(|e| CrawlError::Parse(e.to_string()))?;

    let stubs = rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let link = item.link.trim();
            if link.is_empty() {
                debug!(title = %item.title, "Skipping item without link");
                return None;
            }
            match DateTime::parse_from_rfc2822(item.pub_date.trim()) {
                Ok(published) => Some(ArticleStub {
                    query_url: query_url.to_owned(),
                    title: item.title.trim().to_owned(),
                    published_date: published.naive_utc(),
                    source_url: link.to_owned(),
                }),
                Err(e) => {
                    debug!(%link, pub_date = %item.pub_date, error = %e, "Skipping item with bad pubDate");
                    None
                }
            }
        })
        .collect();
    Ok(stubs)
}
