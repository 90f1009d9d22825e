//! Incrementally checkpointed news corpus.
//!
//! The corpus is loaded in full before the first write of a run and rewritten
//! in full at every checkpoint. Records are only ever appended: a batch merged
//! and checkpointed is never removed. Incoming records whose
//! `(topic, published_date, source_url)` is already present are skipped.
//!
//! A single crawl process is assumed; there is no locking against concurrent
//! writers.

use crate::error::CrawlError;
use crate::models::{ArticleKey, ArticleRecord};
use crate::outputs::json::{read_table, write_table};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug)]
pub struct CorpusStore {
    path: PathBuf,
    records: Vec<ArticleRecord>,
    seen: HashSet<ArticleKey>,
}

impl CorpusStore {
    /// Load the corpus at `path`; a missing file starts an empty corpus.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CrawlError> {
        let path = path.as_ref().to_path_buf();
        let records: Vec<ArticleRecord> = read_table(&path).await?.unwrap_or_default();
        let seen = records.iter().map(ArticleRecord::key).collect();
        info!(records = records.len(), "Loaded corpus");
        Ok(Self {
            path,
            records,
            seen,
        })
    }

    pub fn records(&self) -> &[ArticleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Latest published date already stored for `topic`.
    pub fn resume_cursor(&self, topic: &str) -> Option<NaiveDateTime> {
        self.records
            .iter()
            .filter(|r| r.topic == topic)
            .map(|r| r.published_date)
            .max()
    }

    /// Merge `batch` into the corpus and checkpoint the full corpus.
    ///
    /// Returns the number of records actually added.
    #[instrument(level = "info", skip_all, fields(batch = batch.len()))]
    pub async fn append(&mut self, batch: Vec<ArticleRecord>) -> Result<usize, CrawlError> {
        let before = self.records.len();
        for record in batch {
            if self.seen.insert(record.key()) {
                self.records.push(record);
            }
        }
        let added = self.records.len() - before;
        self.checkpoint().await?;
        info!(added, total = self.records.len(), "Checkpointed corpus");
        Ok(added)
    }

    /// Rewrite the whole corpus to durable storage.
    pub async fn checkpoint(&self) -> Result<(), CrawlError> {
        write_table(&self.records, &self.path).await
    }

    /// Indices and source URLs of records with no page text yet.
    pub fn missing_page_text(&self) -> Vec<(usize, String)> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.page_text.is_none())
            .map(|(i, r)| (i, r.source_url.clone()))
            .collect()
    }

    /// Attach fetched page text to existing records and checkpoint.
    ///
    /// Indices out of range are ignored; returns the number of records updated.
    pub async fn set_page_text(
        &mut self,
        updates: Vec<(usize, String)>,
    ) -> Result<usize, CrawlError> {
        let mut updated = 0;
        for (index, text) in updates {
            if let Some(record) = self.records.get_mut(index) {
                record.page_text = Some(text);
                updated += 1;
            }
        }
        self.checkpoint().await?;
        Ok(updated)
    }
}
