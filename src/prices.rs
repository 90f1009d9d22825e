//! Price history loading and crawl span derivation.
//!
//! Price data is a hard precondition of the crawl: an endpoint failure that
//! survives the retries, or an empty series across all tickers, aborts the run
//! before any news is fetched.

use crate::config::PriceWindow;
use crate::error::CrawlError;
use crate::models::{DateRange, PriceBar};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::scrapers::yahoo::PriceSource;
use itertools::Itertools;
use tracing::{info, instrument, warn};

#[derive(Debug)]
pub struct PriceSeriesLoader<P> {
    source: P,
    retry: RetryPolicy,
}

impl<P: PriceSource> PriceSeriesLoader<P> {
    pub fn new(source: P, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Load daily bars for every ticker, sorted by `(ticker, date)` with one bar per pair.
    #[instrument(level = "info", skip(self))]
    pub async fn load(
        &self,
        tickers: &[String],
        window: &PriceWindow,
    ) -> Result<Vec<PriceBar>, CrawlError> {
        let mut bars = Vec::new();
        for ticker in tickers {
            let series = retry_with_backoff(&self.retry, ticker, || {
                self.source.history(ticker, window)
            })
            .await?;
            if series.is_empty() {
                warn!(%ticker, "No price bars for ticker");
            }
            bars.extend(series);
        }

        if bars.is_empty() {
            return Err(CrawlError::EmptyPriceSeries {
                tickers: tickers.to_vec(),
                window: window.to_string(),
            });
        }

        let bars: Vec<PriceBar> = bars
            .into_iter()
            .sorted_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)))
            .dedup_by(|a, b| a.ticker == b.ticker && a.date == b.date)
            .collect();
        info!(count = bars.len(), "Loaded price series");
        Ok(bars)
    }
}

/// The date span covered by `bars`, from the earliest to the latest bar.
pub fn crawl_span(bars: &[PriceBar]) -> Option<DateRange> {
    let (first, last) = bars.iter().map(|b| b.date).minmax().into_option()?;
    Some(DateRange::new(first, last))
}
