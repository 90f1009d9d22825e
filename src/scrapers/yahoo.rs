//! Yahoo Finance chart API for daily OHLCV history.
//!
//! ```text
//! {base}/v8/finance/chart/{ticker}?interval=1d&period1=..&period2=..
//! {base}/v8/finance/chart/{ticker}?interval=1d&range=1y
//! ```
//!
//! Timestamps are shifted by the exchange's `gmtoffset` before taking the
//! date, so bars land on the exchange's trading day. Rows with any missing
//! price field (halts, partial days) are skipped.

use crate::config::PriceWindow;
use crate::error::CrawlError;
use crate::models::PriceBar;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use tracing::{info, instrument, warn};

/// An endpoint serving daily price history for one ticker.
pub trait PriceSource: Send + Sync {
    fn history(
        &self,
        ticker: &str,
        window: &PriceWindow,
    ) -> impl Future<Output = Result<Vec<PriceBar>, CrawlError>> + Send;
}

#[derive(Debug, Clone)]
pub struct YahooChart {
    client: Client,
    base_url: String,
}

impl YahooChart {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn chart_url(&self, ticker: &str, window: &PriceWindow) -> String {
        let base = format!(
            "{}/v8/finance/chart/{}?interval=1d&events=history",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(ticker)
        );
        match window {
            PriceWindow::Range { start, end } => format!(
                "{base}&period1={}&period2={}",
                midnight_ts(*start),
                midnight_ts(end.succ_opt().unwrap_or(*end))
            ),
            PriceWindow::Period { period } => {
                format!("{base}&range={}", urlencoding::encode(period))
            }
        }
    }
}

fn midnight_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

impl PriceSource for YahooChart {
    #[instrument(level = "info", skip(self))]
    async fn history(
        &self,
        ticker: &str,
        window: &PriceWindow,
    ) -> Result<Vec<PriceBar>, CrawlError> {
        let url = self.chart_url(ticker, window);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        // Yahoo reports unknown tickers as 404 with a JSON error body.
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(CrawlError::upstream(url, status));
        }
        let bars = parse_chart(ticker, &body)?;
        info!(count = bars.len(), "Fetched price history");
        Ok(bars)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Meta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    #[serde(default)]
    gmtoffset: i64,
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Parse a chart API payload into bars for `ticker`.
///
/// # Arguments
///
/// * `ticker` - Used when the payload carries no symbol, and in error messages
/// * `body` - Raw JSON response body
///
/// # Returns
///
/// Daily bars in payload order. Rows with a missing open, high, low or close
/// are skipped. A payload without a result yields an empty series.
///
/// # Errors
///
/// [`CrawlError::UpstreamUnavailable`] for an error object in the payload, and
/// [`CrawlError::Serialization`] for a body that is not a chart envelope.
pub fn parse_chart(ticker: &str, body: &[u8]) -> Result<Vec<PriceBar>, CrawlError> {
    let envelope: ChartEnvelope = serde_json::from_slice(body)?;
    if let Some(err) = envelope.chart.error {
        return Err(CrawlError::upstream(
            format!("yahoo chart {ticker}"),
            format!("{}: {}", err.code, err.description),
        ));
    }
    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        warn!(%ticker, "Chart payload has no result");
        return Ok(Vec::new());
    };
    let symbol = result.meta.symbol.unwrap_or_else(|| ticker.to_owned());
    let offset = result.meta.gmtoffset;
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let bars = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
            Some(PriceBar {
                ticker: symbol.clone(),
                date,
                open: (*quote.open.get(i)?)?,
                high: (*quote.high.get(i)?)?,
                low: (*quote.low.get(i)?)?,
                close: (*quote.close.get(i)?)?,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            })
        })
        .collect();
    Ok(bars)
}
