//! Joining the price series with the news corpus.
//!
//! Each article is attributed to its topic's price bar on the article's
//! published date. Articles published on a non-trading day roll forward to the
//! next trading day; articles after the last bar are left out.

use crate::models::{ArticleRecord, CombinedRow, PriceBar};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::{debug, info};

/// Build one [`CombinedRow`] per price bar, in the order of `bars`.
pub fn combine(bars: &[PriceBar], articles: &[ArticleRecord]) -> Vec<CombinedRow> {
    // Trading dates per ticker, sorted, with the bar index for each.
    let calendars: HashMap<&str, Vec<(chrono::NaiveDate, usize)>> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| (bar.ticker.as_str(), (bar.date, i)))
        .into_group_map()
        .into_iter()
        .map(|(ticker, mut days)| {
            days.sort_unstable();
            (ticker, days)
        })
        .collect();

    let mut attributed: HashMap<usize, Vec<&ArticleRecord>> = HashMap::new();
    let mut unmatched = 0usize;
    for article in articles {
        let Some(days) = calendars.get(article.topic.as_str()) else {
            unmatched += 1;
            continue;
        };
        let published = article.published_date.date();
        let pos = days.partition_point(|(date, _)| *date < published);
        match days.get(pos) {
            Some((_, bar_index)) => attributed.entry(*bar_index).or_default().push(article),
            None => unmatched += 1,
        }
    }
    if unmatched > 0 {
        debug!(unmatched, "Articles without a matching trading day");
    }

    let rows: Vec<CombinedRow> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let news = attributed.remove(&i).unwrap_or_default();
            CombinedRow {
                ticker: bar.ticker.clone(),
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                article_count: news.len(),
                headlines: news.iter().map(|a| a.title.clone()).collect(),
                sources: news
                    .iter()
                    .filter_map(|a| a.source_host())
                    .unique()
                    .collect(),
            }
        })
        .collect();

    info!(
        rows = rows.len(),
        articles = articles.len() - unmatched,
        "Combined prices with news"
    );
    rows
}
