//! Upstream endpoints and the per-partition article fetcher.
//!
//! Fetching news follows a two-phase pattern:
//!
//! 1. **Search**: query the news-search endpoint for a topic restricted to a
//!    date range, yielding [`ArticleStub`]s
//! 2. **Resolve**: fetch each stub's page and extract its title and full text
//!
//! # Endpoints
//!
//! | Endpoint | Module | Notes |
//! |----------|--------|-------|
//! | News search | [`google_news`] | Google News RSS search, date-bounded query |
//! | Article resolution | [`article`] | HTML extraction of title and paragraphs |
//! | Raw page text | [`page`] | Markup stripping for the body backfill run |
//! | Price history | [`yahoo`] | Yahoo chart API, daily bars |
//!
//! Resolution failures are expected: the article is dropped and the batch goes on.

use crate::coordinator::FetchArticles;
use crate::error::CrawlError;
use crate::models::{ArticleRecord, ArticleStub, DateRange, ResolvedArticle};
use crate::utils::truncate_for_log;
use std::future::Future;
use tracing::{debug, info, instrument};

pub mod article;
pub mod google_news;
pub mod page;
pub mod yahoo;

/// A news-search endpoint queried by topic and date window.
pub trait NewsSearch: Send + Sync {
    /// Return at most `max_results` stubs for `topic` published within `range`.
    fn search(
        &self,
        topic: &str,
        range: DateRange,
        max_results: usize,
    ) -> impl Future<Output = Result<Vec<ArticleStub>, CrawlError>> + Send;
}

/// An endpoint resolving an article URL to its title and full text.
pub trait ArticleResolver: Send + Sync {
    fn resolve(&self, url: &str) -> impl Future<Output = Result<ResolvedArticle, CrawlError>> + Send;
}

/// Fetches the resolved articles for one topic and one date partition.
#[derive(Debug)]
pub struct ArticleFetcher<S, R> {
    search: S,
    resolver: R,
    max_results: usize,
}

impl<S, R> ArticleFetcher<S, R>
where
    S: NewsSearch,
    R: ArticleResolver,
{
    pub fn new(search: S, resolver: R, max_results: usize) -> Self {
        Self {
            search,
            resolver,
            max_results,
        }
    }

    /// Search `topic` within `range`, then resolve every hit.
    ///
    /// Hits whose resolution fails, or resolves to an empty body, are dropped.
    /// Output keeps the search endpoint's order.
    #[instrument(level = "info", skip(self), fields(%range))]
    pub async fn fetch(
        &self,
        topic: &str,
        range: DateRange,
    ) -> Result<Vec<ArticleRecord>, CrawlError> {
        let mut stubs = self.search.search(topic, range, self.max_results).await?;
        stubs.truncate(self.max_results);
        let found = stubs.len();

        let mut records = Vec::with_capacity(found);
        for stub in stubs {
            match self.resolver.resolve(&stub.source_url).await {
                Ok(resolved) if !resolved.body.trim().is_empty() => {
                    debug!(url = %stub.source_url, "Resolved article");
                    records.push(ArticleRecord::from_resolved(topic, stub, resolved));
                }
                Ok(_) => {
                    info!(
                        url = %stub.source_url,
                        title = %truncate_for_log(&stub.title, 80),
                        "Article resolved to an empty body; dropping"
                    );
                }
                Err(e) => {
                    info!(
                        url = %stub.source_url,
                        title = %truncate_for_log(&stub.title, 80),
                        error = %e,
                        "Unable to resolve article; dropping"
                    );
                }
            }
        }

        info!(
            found,
            resolved = records.len(),
            dropped = found - records.len(),
            "Fetched partition"
        );
        Ok(records)
    }
}

impl<S, R> FetchArticles for ArticleFetcher<S, R>
where
    S: NewsSearch + 'static,
    R: ArticleResolver + 'static,
{
    async fn fetch(
        &self,
        topic: &str,
        range: DateRange,
    ) -> Result<Vec<ArticleRecord>, CrawlError> {
        ArticleFetcher::fetch(self, topic, range).await
    }
}
