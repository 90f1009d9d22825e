//! Parallel fan-out of article fetches over date partitions.
//!
//! One tokio task is spawned per partition. Workers share nothing but an
//! immutable fetcher handle and the sending half of a bounded channel sized to
//! the number of partitions. Each worker enforces its own deadline, so the
//! coordinator never waits on a partition longer than the worker timeout:
//! a worker that overruns reports an empty result instead of hanging the drain.
//!
//! Results are reassembled in partition order, not completion order, and the
//! topic is stamped onto every record.

use crate::error::CrawlError;
use crate::models::{ArticleRecord, DateRange};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{info, instrument, warn};

/// Fetches the articles for one topic over one partition.
pub trait FetchArticles: Send + Sync + 'static {
    fn fetch(
        &self,
        topic: &str,
        range: DateRange,
    ) -> impl Future<Output = Result<Vec<ArticleRecord>, CrawlError>> + Send;
}

/// How a single partition worker ended.
#[derive(Debug)]
enum WorkerOutcome {
    Completed(Vec<ArticleRecord>),
    Failed,
    TimedOut,
}

/// Result of crawling one topic over a set of partitions.
#[derive(Debug, Default)]
pub struct CrawlReport {
    /// Records from every completed partition, in partition order.
    pub records: Vec<ArticleRecord>,
    pub partitions: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Partitions that never reported: aborted at the deadline, or panicked.
    pub missing: usize,
    /// The global deadline expired before every partition reported.
    pub deadline_hit: bool,
}

#[derive(Debug)]
pub struct CrawlCoordinator<F> {
    fetcher: Arc<F>,
    worker_timeout: Duration,
}

impl<F: FetchArticles> CrawlCoordinator<F> {
    pub fn new(fetcher: Arc<F>, worker_timeout: Duration) -> Self {
        Self {
            fetcher,
            worker_timeout,
        }
    }

    /// Crawl `topic` over `ranges` and concatenate the results in partition order.
    pub async fn run(&self, topic: &str, ranges: &[DateRange]) -> Vec<ArticleRecord> {
        self.run_until(topic, ranges, None).await.records
    }

    /// Like [`run`](Self::run), but stops draining at `deadline`, aborting the
    /// workers still outstanding and keeping whatever already completed.
    #[instrument(level = "info", skip(self, ranges), fields(partitions = ranges.len()))]
    pub async fn run_until(
        &self,
        topic: &str,
        ranges: &[DateRange],
        deadline: Option<Instant>,
    ) -> CrawlReport {
        let mut report = CrawlReport {
            partitions: ranges.len(),
            ..CrawlReport::default()
        };
        if ranges.is_empty() {
            return report;
        }

        let (tx, mut rx) = mpsc::channel::<(usize, WorkerOutcome)>(ranges.len());
        let mut handles = Vec::with_capacity(ranges.len());

        for (index, range) in ranges.iter().copied().enumerate() {
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let topic = topic.to_owned();
            let budget = self.worker_timeout;

            handles.push(tokio::spawn(async move {
                let outcome = match timeout(budget, fetcher.fetch(&topic, range)).await {
                    Ok(Ok(records)) => WorkerOutcome::Completed(records),
                    Ok(Err(e)) => {
                        warn!(%topic, %range, error = %e, "Partition fetch failed; using zero articles");
                        WorkerOutcome::Failed
                    }
                    Err(_) => {
                        let e = CrawlError::WorkerTimeout {
                            range,
                            timeout: budget,
                        };
                        warn!(%topic, error = %e, "Partition fetch timed out; using zero articles");
                        WorkerOutcome::TimedOut
                    }
                };
                // The receiver is gone once the global deadline has passed.
                let _ = tx.send((index, outcome)).await;
            }));
        }
        drop(tx);

        let mut slots: Vec<Option<Vec<ArticleRecord>>> = (0..ranges.len()).map(|_| None).collect();
        let mut received = 0;
        while received < ranges.len() {
            let next = match deadline {
                Some(at) => match timeout_at(at, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        report.deadline_hit = true;
                        break;
                    }
                },
                None => rx.recv().await,
            };
            // None: every sender dropped, so the remaining workers died without reporting.
            let Some((index, outcome)) = next else { break };
            received += 1;

            match outcome {
                WorkerOutcome::Completed(records) => {
                    report.completed += 1;
                    slots[index] = Some(records);
                }
                WorkerOutcome::Failed => report.failed += 1,
                WorkerOutcome::TimedOut => report.timed_out += 1,
            }
        }

        if received < ranges.len() {
            for handle in &handles {
                handle.abort();
            }
            report.missing = ranges.len() - received;
            warn!(
                %topic,
                missing = report.missing,
                deadline_hit = report.deadline_hit,
                "Partitions did not report"
            );
        }

        report.records = slots
            .into_iter()
            .flatten()
            .flatten()
            .map(|mut record| {
                record.topic = topic.to_owned();
                record
            })
            .collect();

        info!(
            %topic,
            partitions = report.partitions,
            records = report.records.len(),
            completed = report.completed,
            failed = report.failed,
            timed_out = report.timed_out,
            "Crawled partitions"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::ArticleFetcher;
    use crate::scrapers::fakes::{DailySearch, FailingSearch, MapResolver};
    use crate::partition::partition;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record_for(range: DateRange) -> ArticleRecord {
        ArticleRecord {
            topic: "unset".to_string(),
            query_url: String::new(),
            published_date: range.start.and_hms_opt(9, 0, 0).unwrap(),
            title: range.to_string(),
            fetched_title: range.to_string(),
            fetched_body: "body".to_string(),
            source_url: format!("https://news.test/{}", range.start),
            page_text: None,
        }
    }

    /// Earlier partitions finish later; selected partitions fail or hang.
    #[derive(Debug, Default)]
    struct ScriptedFetcher {
        fail: Vec<NaiveDate>,
        hang: Vec<NaiveDate>,
    }

    impl FetchArticles for ScriptedFetcher {
        async fn fetch(
            &self,
            _topic: &str,
            range: DateRange,
        ) -> Result<Vec<ArticleRecord>, CrawlError> {
            if self.hang.contains(&range.start) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail.contains(&range.start) {
                return Err(CrawlError::upstream("search", "502 Bad Gateway"));
            }
            let reversed = 40 - range.start.signed_duration_since(d("2023-01-01")).num_days();
            tokio::time::sleep(Duration::from_millis(reversed as u64 * 10)).await;
            Ok(vec![record_for(range)])
        }
    }

    fn ranges() -> Vec<DateRange> {
        partition(d("2023-01-01"), d("2023-01-30"), 5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_follows_partition_order() {
        let coordinator =
            CrawlCoordinator::new(Arc::new(ScriptedFetcher::default()), Duration::from_secs(60));

        let records = coordinator.run("AAPL", &ranges()).await;

        let titles: Vec<_> = records.iter().map(|r| r.title.clone()).collect();
        let expected: Vec<_> = ranges().iter().map(DateRange::to_string).collect();
        assert_eq!(titles, expected);
        assert!(records.iter().all(|r| r.topic == "AAPL"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_and_timeouts_yield_empty_partitions() {
        let ranges = ranges();
        let fetcher = ScriptedFetcher {
            fail: vec![ranges[1].start],
            hang: vec![ranges[3].start],
        };
        let coordinator = CrawlCoordinator::new(Arc::new(fetcher), Duration::from_secs(5));

        let report = coordinator.run_until("MSFT", &ranges, None).await;

        assert_eq!(report.partitions, 5);
        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.missing, 0);
        assert!(!report.deadline_hit);
        let titles: Vec<_> = report.records.iter().map(|r| r.title.clone()).collect();
        assert_eq!(
            titles,
            vec![ranges[0].to_string(), ranges[2].to_string(), ranges[4].to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_deadline_keeps_completed_partitions() {
        let ranges = ranges();
        let fetcher = ScriptedFetcher {
            fail: Vec::new(),
            hang: vec![ranges[0].start, ranges[2].start],
        };
        let coordinator = CrawlCoordinator::new(Arc::new(fetcher), Duration::from_secs(7200));
        let deadline = Instant::now() + Duration::from_secs(10);

        let report = coordinator.run_until("TSLA", &ranges, Some(deadline)).await;

        assert!(report.deadline_hit);
        assert_eq!(report.completed, 3);
        assert_eq!(report.missing, 2);
        let titles: Vec<_> = report.records.iter().map(|r| r.title.clone()).collect();
        assert_eq!(
            titles,
            vec![ranges[1].to_string(), ranges[3].to_string(), ranges[4].to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_ranges_spawn_nothing() {
        let coordinator =
            CrawlCoordinator::new(Arc::new(ScriptedFetcher::default()), Duration::from_secs(1));
        let report = coordinator.run_until("AAPL", &[], None).await;
        assert_eq!(report.partitions, 0);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_drives_article_fetcher() {
        let fetcher = ArticleFetcher::new(DailySearch, MapResolver::default(), 100);
        let coordinator = CrawlCoordinator::new(Arc::new(fetcher), Duration::from_secs(5));

        let records = coordinator.run("NVDA", &partition(d("2023-01-01"), d("2023-01-10"), 3)).await;

        assert_eq!(records.len(), 10);
        let dates: Vec<_> = records.iter().map(|r| r.published_date.date()).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[tokio::test]
    async fn test_search_outage_degrades_to_zero_articles() {
        let fetcher = ArticleFetcher::new(FailingSearch, MapResolver::default(), 100);
        let coordinator = CrawlCoordinator::new(Arc::new(fetcher), Duration::from_secs(5));

        let report = coordinator.run_until("NVDA", &ranges(), None).await;

        assert!(report.records.is_empty());
        assert_eq!(report.failed, 5);
    }
}
