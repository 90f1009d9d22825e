//! Raw page text for the body backfill run.
//!
//! All pages of a batch are fetched concurrently inside the calling task and
//! results come back positionally, one `Option` per input URL. Any network,
//! status or timeout failure yields `None` for that URL without affecting
//! the rest of the batch.

use crate::utils::{collapse_whitespace, decode_lossy};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::{Html, Node};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    request_timeout: Duration,
    concurrency: usize,
}

impl PageFetcher {
    pub fn new(client: Client, request_timeout: Duration, concurrency: usize) -> Self {
        Self {
            client,
            request_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every URL concurrently, at most `concurrency` requests in flight.
    ///
    /// # Arguments
    ///
    /// * `urls` - Pages to fetch, usually article source URLs from the corpus
    ///
    /// # Returns
    ///
    /// One entry per input URL, in input order: the page's visible text, or
    /// `None` when the request failed, returned a non-success status or did
    /// not finish within the request timeout.
    #[instrument(level = "info", skip_all, fields(urls = urls.len()))]
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<Option<String>> {
        let pages: Vec<Option<String>> = stream::iter(urls)
            .map(|url| self.fetch_text(url))
            .buffered(self.concurrency)
            .collect()
            .await;

        let fetched = pages.iter().filter(|p| p.is_some()).count();
        info!(fetched, failed = urls.len() - fetched, "Fetched page bodies");
        pages
    }

    /// GET `url` with redirects followed and return its markup-free text.
    pub async fn fetch_text(&self, url: &str) -> Option<String> {
        match timeout(self.request_timeout, self.fetch_body(url)).await {
            Ok(Ok(body)) => Some(strip_markup(&decode_lossy(&body))),
            Ok(Err(e)) => {
                info!(%url, error = %e, "Unable to get page");
                None
            }
            Err(_) => {
                info!(%url, timeout = ?self.request_timeout, "Page request timed out");
                None
            }
        }
    }

    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        debug!(%url, bytes = bytes.len(), "Downloaded page");
        Ok(bytes.to_vec())
    }
}

/// Reduce an HTML document to its visible text, one space between text nodes.
pub fn strip_markup(html: &str) -> String {
    let document = Html::parse_document(html);
    let parts: Vec<&str> = document
        .root_element()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|a| {
                    a.value().as_element().is_some_and(|e| {
                        matches!(e.name(), "script" | "style" | "noscript" | "template")
                    })
                });
                (!hidden).then_some(&**text)
            }
            _ => None,
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    collapse_whitespace(&parts.join(" "))
}
