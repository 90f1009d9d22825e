//! Splitting a crawl span into date partitions.
//!
//! The news-search endpoint caps the number of hits per query regardless of
//! how wide the date window is, so a long span is narrowed into sub-ranges
//! that are crawled independently. Two strategies are available:
//!
//! - **Count**: exactly `min(n, total_days)` contiguous ranges of near-equal
//!   length, the remainder days going to the earliest ranges.
//! - **Weekly**: calendar weeks running Sunday through Saturday, with the first
//!   and last week clipped to the span.
//!
//! Both strategies return an empty sequence for an inverted span, which callers
//! treat as "nothing to crawl".

use crate::models::DateRange;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Partitioning strategy, selected in the crawl configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PartitionStrategy {
    Count { partitions: usize },
    Weekly,
}

impl Default for PartitionStrategy {
    fn default() -> Self {
        PartitionStrategy::Count { partitions: 12 }
    }
}

impl PartitionStrategy {
    pub fn partition(&self, start: NaiveDate, end: NaiveDate) -> Vec<DateRange> {
        match *self {
            PartitionStrategy::Count { partitions } => partition(start, end, partitions),
            PartitionStrategy::Weekly => partition_weekly(start, end),
        }
    }
}

/// Split `[start, end]` into `min(n, total_days)` contiguous ranges.
///
/// Each range is `total_days / n` days long; the first `total_days % n` ranges
/// get one extra day.
pub fn partition(start: NaiveDate, end: NaiveDate, n: usize) -> Vec<DateRange> {
    if start > end || n == 0 {
        return Vec::new();
    }
    let total_days = (end - start).num_days() + 1;
    let count = i64::try_from(n).map_or(total_days, |n| n.min(total_days));
    let base = total_days / count;
    let remainder = total_days % count;

    let mut ranges = Vec::with_capacity(count as usize);
    let mut cursor = start;
    for i in 0..count {
        let len = base + i64::from(i < remainder);
        let range_end = cursor
            .checked_add_signed(Duration::days(len - 1))
            .map_or(end, |d| d.min(end));
        ranges.push(DateRange::new(cursor, range_end));
        // No successor past the last representable day.
        let Some(next) = range_end.succ_opt() else { break };
        cursor = next;
    }
    ranges
}

/// Split `[start, end]` into Sunday–Saturday weeks clipped to the span.
pub fn partition_weekly(start: NaiveDate, end: NaiveDate) -> Vec<DateRange> {
    let mut ranges = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let to_saturday = 6 - i64::from(cursor.weekday().num_days_from_sunday());
        let week_end = cursor
            .checked_add_signed(Duration::days(to_saturday))
            .map_or(end, |d| d.min(end));
        ranges.push(DateRange::new(cursor, week_end));
        let Some(next) = week_end.succ_opt() else { break };
        cursor = next;
    }
    ranges
}
