//! End-to-end runs: crawl, body backfill and combine.
//!
//! A crawl proceeds as:
//! 1. **Prices**: reuse the persisted price series, or load and persist it;
//!    its date span bounds the crawl
//! 2. **Resume**: load the corpus and compute each topic's start from its cursor
//! 3. **Partition**: split `[start, span end]` with the configured strategy
//! 4. **Fan out**: crawl `batch_size` partitions at a time in parallel
//! 5. **Checkpoint**: merge each batch into the corpus and rewrite it
//! 6. **Combine**: join prices with the corpus
//!
//! The corpus cursor only moves forward, so running the crawl repeatedly picks
//! up where the last checkpoint ended. The cursor's own day is crawled again;
//! the store drops the duplicates.

use crate::combine::combine;
use crate::config::CrawlConfig;
use crate::coordinator::{CrawlCoordinator, FetchArticles};
use crate::error::CrawlError;
use crate::models::{ArticleRecord, DateRange, PriceBar};
use crate::outputs::json::{read_table, write_table};
use crate::partition::PartitionStrategy;
use crate::prices::{PriceSeriesLoader, crawl_span};
use crate::retry::RetryPolicy;
use crate::scrapers::ArticleFetcher;
use crate::scrapers::article::HttpArticleResolver;
use crate::scrapers::google_news::GoogleNewsSearch;
use crate::scrapers::page::PageFetcher;
use crate::scrapers::yahoo::{PriceSource, YahooChart};
use crate::store::CorpusStore;
use crate::utils::{build_client, ensure_writable_dir};
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub topics: usize,
    pub partitions: usize,
    pub added: usize,
    pub corpus_size: usize,
    pub deadline_hit: bool,
}

/// First day to crawl for a topic whose latest stored article is `cursor`.
pub fn resume_start(span_start: NaiveDate, cursor: Option<NaiveDateTime>) -> NaiveDate {
    cursor.map_or(span_start, |c| c.date().max(span_start))
}

/// Crawl every topic over its remaining span, checkpointing after each batch.
#[instrument(level = "info", skip_all, fields(topics = topics.len(), %span))]
pub async fn crawl_topics<F: FetchArticles>(
    coordinator: &CrawlCoordinator<F>,
    store: &mut CorpusStore,
    topics: &[String],
    span: DateRange,
    strategy: PartitionStrategy,
    batch_size: usize,
    deadline: Option<Instant>,
) -> Result<CrawlSummary, CrawlError> {
    let mut summary = CrawlSummary {
        topics: topics.len(),
        ..CrawlSummary::default()
    };

    'topics: for topic in topics {
        let start = resume_start(span.start, store.resume_cursor(topic));
        let ranges = strategy.partition(start, span.end);
        if ranges.is_empty() {
            info!(%topic, %start, "Nothing to crawl");
            continue;
        }
        info!(%topic, %start, end = %span.end, partitions = ranges.len(), "Crawling topic");

        for batch in ranges.chunks(batch_size.max(1)) {
            let report = coordinator.run_until(topic, batch, deadline).await;
            summary.partitions += report.completed;
            summary.added += store.append(report.records).await?;

            if report.deadline_hit {
                warn!(%topic, "Run deadline reached; stopping after checkpoint");
                summary.deadline_hit = true;
                break 'topics;
            }
        }
    }

    summary.corpus_size = store.len();
    Ok(summary)
}

/// Price series for the run: the persisted table when one exists, otherwise
/// freshly loaded from the endpoint and persisted.
///
/// # Errors
///
/// Returns [`CrawlError::EmptyPriceSeries`] or [`CrawlError::UpstreamUnavailable`]
/// when no table exists and the endpoint yields nothing, and
/// [`CrawlError::Storage`] / [`CrawlError::Serialization`] if the table cannot
/// be read or written.
#[instrument(level = "info", skip_all)]
pub async fn load_prices<P: PriceSource>(
    loader: &PriceSeriesLoader<P>,
    config: &CrawlConfig,
) -> Result<Vec<PriceBar>, CrawlError> {
    let path = config.prices_path();
    let persisted: Option<Vec<PriceBar>> = read_table(&path).await?;
    if let Some(bars) = persisted.filter(|bars| !bars.is_empty()) {
        info!(bars = bars.len(), "Reusing persisted price series");
        return Ok(bars);
    }

    let bars = loader.load(&config.tickers, &config.price_window).await?;
    write_table(&bars, &path).await?;
    Ok(bars)
}

/// Crawl with the given price loader and coordinator.
///
/// Prices establish the span, then every topic is crawled from its resume
/// cursor and the combined dataset is rebuilt.
pub async fn crawl_with<P: PriceSource, F: FetchArticles>(
    config: &CrawlConfig,
    loader: &PriceSeriesLoader<P>,
    coordinator: &CrawlCoordinator<F>,
) -> Result<CrawlSummary, CrawlError> {
    let started = Instant::now();
    let deadline = config.run_deadline().map(|d| started + d);
    ensure_writable_dir(&config.data_dir).await?;

    let bars = load_prices(loader, config).await?;
    let span = crawl_span(&bars).ok_or_else(|| CrawlError::EmptyPriceSeries {
        tickers: config.tickers.clone(),
        window: config.price_window.to_string(),
    })?;
    info!(%span, bars = bars.len(), "Price series establishes crawl span");

    let mut store = CorpusStore::load(config.corpus_path()).await?;
    if store.is_empty() {
        info!("Starting a fresh corpus");
    }

    let summary = crawl_topics(
        coordinator,
        &mut store,
        &config.topics(),
        span,
        config.partition,
        config.batch_size,
        deadline,
    )
    .await?;

    let rows = combine(&bars, store.records());
    write_table(&rows, &config.combined_path()).await?;

    info!(
        topics = summary.topics,
        added = summary.added,
        corpus = summary.corpus_size,
        partitions = summary.partitions,
        deadline_hit = summary.deadline_hit,
        elapsed_secs = started.elapsed().as_secs(),
        "Crawl complete"
    );
    Ok(summary)
}

/// The full crawl run described by `config`, against the live endpoints.
#[instrument(level = "info", skip_all)]
pub async fn run_crawl(config: &CrawlConfig) -> Result<CrawlSummary, CrawlError> {
    let client = build_client(config)?;
    let loader = PriceSeriesLoader::new(
        YahooChart::new(client.clone(), &config.price_base_url),
        RetryPolicy::new(config.price_retries, Duration::from_secs(1)),
    );
    let fetcher = ArticleFetcher::new(
        GoogleNewsSearch::new(
            client.clone(),
            &config.search_base_url,
            &config.language,
            &config.country,
        ),
        HttpArticleResolver::new(client),
        config.max_results,
    );
    let coordinator = CrawlCoordinator::new(Arc::new(fetcher), config.worker_timeout());

    crawl_with(config, &loader, &coordinator).await
}

/// Fill in `page_text` for every record lacking it, checkpointing per batch.
///
/// Pages that cannot be fetched stay empty and are retried on the next run.
pub async fn backfill(
    store: &mut CorpusStore,
    pages: &PageFetcher,
    batch_size: usize,
) -> Result<usize, CrawlError> {
    let missing = store.missing_page_text();
    info!(missing = missing.len(), "Backfilling page bodies");

    let mut filled = 0;
    for batch in missing.chunks(batch_size.max(1)) {
        let urls: Vec<String> = batch.iter().map(|(_, url)| url.clone()).collect();
        let texts = pages.fetch_all(&urls).await;
        let updates: Vec<(usize, String)> = batch
            .iter()
            .zip(texts)
            .filter_map(|((index, _), text)| text.map(|t| (*index, t)))
            .collect();
        filled += store.set_page_text(updates).await?;
    }
    Ok(filled)
}

#[instrument(level = "info", skip_all)]
pub async fn run_backfill(config: &CrawlConfig) -> Result<usize, CrawlError> {
    let client = build_client(config)?;
    let pages = PageFetcher::new(client, config.request_timeout(), config.backfill_concurrency);
    let mut store = CorpusStore::load(config.corpus_path()).await?;

    let filled = backfill(&mut store, &pages, config.backfill_batch_size).await?;
    info!(filled, corpus = store.len(), "Backfill complete");
    Ok(filled)
}

/// Rebuild the combined dataset from the persisted prices and corpus.
#[instrument(level = "info", skip_all)]
pub async fn run_combine(config: &CrawlConfig) -> Result<usize, CrawlError> {
    let bars: Vec<PriceBar> = read_table(&config.prices_path())
        .await?
        .unwrap_or_default();
    let articles: Vec<ArticleRecord> = read_table(&config.corpus_path())
        .await?
        .unwrap_or_default();
    if bars.is_empty() {
        return Err(CrawlError::EmptyPriceSeries {
            tickers: config.tickers.clone(),
            window: config.price_window.to_string(),
        });
    }

    let rows = combine(&bars, &articles);
    write_table(&rows, &config.combined_path()).await?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceWindow;
    use crate::scrapers::fakes::{DailySearch, MapResolver};
    use reqwest::Client;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn coordinator() -> CrawlCoordinator<ArticleFetcher<DailySearch, MapResolver>> {
        let fetcher = ArticleFetcher::new(DailySearch, MapResolver::default(), 100);
        CrawlCoordinator::new(Arc::new(fetcher), Duration::from_secs(5))
    }

    fn topics() -> Vec<String> {
        vec!["AAPL".to_string(), "MSFT".to_string()]
    }

    #[test]
    fn test_resume_start_never_precedes_cursor() {
        let span_start = d("2023-01-01");
        assert_eq!(resume_start(span_start, None), span_start);
        let cursor = d("2023-02-10").and_hms_opt(18, 0, 0);
        assert_eq!(resume_start(span_start, cursor), d("2023-02-10"));
        let stale = d("2022-12-01").and_hms_opt(0, 0, 0);
        assert_eq!(resume_start(span_start, stale), span_start);
    }

    #[tokio::test]
    async fn test_crawl_then_resume_adds_only_new_days() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let strategy = PartitionStrategy::Count { partitions: 3 };

        let mut store = CorpusStore::load(&path).await.unwrap();
        let first = crawl_topics(
            &coordinator(),
            &mut store,
            &topics(),
            DateRange::new(d("2023-01-01"), d("2023-01-10")),
            strategy,
            2,
            None,
        )
        .await
        .unwrap();
        assert_eq!(first.added, 20);
        assert_eq!(first.partitions, 6);
        assert_eq!(
            store.resume_cursor("AAPL").map(|c| c.date()),
            Some(d("2023-01-10"))
        );

        let mut store = CorpusStore::load(&path).await.unwrap();
        let second = crawl_topics(
            &coordinator(),
            &mut store,
            &topics(),
            DateRange::new(d("2023-01-01"), d("2023-01-15")),
            strategy,
            2,
            None,
        )
        .await
        .unwrap();
        assert_eq!(second.added, 10);
        assert_eq!(second.corpus_size, 30);
        assert_eq!(
            store.resume_cursor("MSFT").map(|c| c.date()),
            Some(d("2023-01-15"))
        );
    }

    #[tokio::test]
    async fn test_recrawl_of_finished_span_adds_nothing() {
        let dir = tempdir().unwrap();
        let mut store = CorpusStore::load(dir.path().join("corpus.json")).await.unwrap();
        let span = DateRange::new(d("2023-01-01"), d("2023-01-03"));
        crawl_topics(&coordinator(), &mut store, &topics(), span, PartitionStrategy::Weekly, 4, None)
            .await
            .unwrap();

        let again = crawl_topics(
            &coordinator(),
            &mut store,
            &topics(),
            span,
            PartitionStrategy::Weekly,
            4,
            None,
        )
        .await
        .unwrap();
        assert_eq!(again.added, 0);
        assert_eq!(again.corpus_size, 6);
    }

    #[tokio::test]
    async fn test_backfill_fills_fetchable_pages() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/a")
            .with_status(200)
            .with_body("<html><body><p>Full page</p></body></html>")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let mut store = CorpusStore::load(&path).await.unwrap();
        let base = ArticleRecord {
            topic: "AAPL".to_string(),
            query_url: String::new(),
            published_date: d("2023-01-02").and_hms_opt(8, 0, 0).unwrap(),
            title: "t".to_string(),
            fetched_title: "t".to_string(),
            fetched_body: "b".to_string(),
            source_url: format!("{}/a", server.url()),
            page_text: None,
        };
        let mut unreachable = base.clone();
        unreachable.source_url = "http://127.0.0.1:1/b".to_string();
        store.append(vec![base, unreachable]).await.unwrap();

        let pages = PageFetcher::new(Client::new(), Duration::from_secs(5), 2);
        let filled = backfill(&mut store, &pages, 1).await.unwrap();

        assert_eq!(filled, 1);
        let reloaded = CorpusStore::load(&path).await.unwrap();
        assert_eq!(reloaded.records()[0].page_text.as_deref(), Some("Full page"));
        assert_eq!(reloaded.records()[1].page_text, None);
    }

    /// A price endpoint that is down for every ticker.
    #[derive(Debug, Default)]
    struct DownPrices {
        calls: Arc<AtomicUsize>,
    }

    impl PriceSource for DownPrices {
        async fn history(
            &self,
            _ticker: &str,
            _window: &PriceWindow,
        ) -> Result<Vec<PriceBar>, CrawlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CrawlError::upstream("prices", "503 Service Unavailable"))
        }
    }

    /// Serves one bar per ticker per requested day.
    #[derive(Debug)]
    struct FixedPrices(Vec<NaiveDate>);

    impl PriceSource for FixedPrices {
        async fn history(
            &self,
            ticker: &str,
            _window: &PriceWindow,
        ) -> Result<Vec<PriceBar>, CrawlError> {
            Ok(self.0.iter().map(|day| bar(ticker, *day)).collect())
        }
    }

    fn bar(ticker: &str, date: NaiveDate) -> PriceBar {
        PriceBar {
            ticker: ticker.to_string(),
            date,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
        }
    }

    fn config_in(dir: &std::path::Path) -> CrawlConfig {
        CrawlConfig {
            data_dir: dir.to_path_buf(),
            tickers: topics(),
            partition: PartitionStrategy::Count { partitions: 3 },
            ..CrawlConfig::default()
        }
    }

    #[tokio::test]
    async fn test_resume_reuses_persisted_prices_while_endpoint_is_down() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let persisted: Vec<PriceBar> = ["AAPL", "MSFT"]
            .iter()
            .flat_map(|t| [bar(t, d("2023-01-02")), bar(t, d("2023-01-06"))])
            .collect();
        write_table(&persisted, &config.prices_path()).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let loader = PriceSeriesLoader::new(
            DownPrices {
                calls: Arc::clone(&calls),
            },
            RetryPolicy::new(1, Duration::from_millis(10)),
        );
        let summary = crawl_with(&config, &loader, &coordinator()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.added, 10);
        let stored: Vec<PriceBar> = read_table(&config.prices_path()).await.unwrap().unwrap();
        assert_eq!(stored, persisted);
        assert!(config.combined_path().exists());
    }

    #[tokio::test]
    async fn test_first_run_fetches_and_persists_prices() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let loader = PriceSeriesLoader::new(
            FixedPrices(vec![d("2023-01-03"), d("2023-01-04")]),
            RetryPolicy::new(0, Duration::from_millis(10)),
        );

        let bars = load_prices(&loader, &config).await.unwrap();

        assert_eq!(bars.len(), 4);
        let stored: Vec<PriceBar> = read_table(&config.prices_path()).await.unwrap().unwrap();
        assert_eq!(stored, bars);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_with_endpoint_down_is_fatal() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let loader = PriceSeriesLoader::new(
            DownPrices::default(),
            RetryPolicy::new(1, Duration::from_millis(10)),
        );

        let result = crawl_with(&config, &loader, &coordinator()).await;

        assert!(matches!(result, Err(CrawlError::UpstreamUnavailable { .. })));
        assert!(!config.corpus_path().exists());
    }

    #[tokio::test]
    async fn test_run_combine_requires_prices() {
        let dir = tempdir().unwrap();
        let config = CrawlConfig {
            data_dir: dir.path().to_path_buf(),
            ..CrawlConfig::default()
        };
        assert!(matches!(
            run_combine(&config).await,
            Err(CrawlError::EmptyPriceSeries { .. })
        ));

        let bars = vec![PriceBar {
            ticker: "AAPL".to_string(),
            date: d("2023-01-03"),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
        }];
        write_table(&bars, &config.prices_path()).await.unwrap();
        assert_eq!(run_combine(&config).await.unwrap(), 1);
        assert!(config.combined_path().exists());
    }
}
