//! Deduplicating batch writer.
//!
//! Records are checked against the store (and the batch being built) by natural
//! key before they are queued, then written in bulk once `batch_size` records are
//! pending. When a bulk insert is rejected the same batch is retried one record
//! at a time, so a single bad record costs only itself.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::models::NewRecord;
use crate::store::CatalogStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Queued,
    /// Already stored, or already pending in this run.
    Duplicate,
    /// Queued, and the batch it completed was flushed.
    Flushed(FlushReport),
}

/// Result of writing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub attempted: usize,
    pub persisted: usize,
    pub failed: usize,
    /// Whether the bulk insert was rejected and records were written one by one.
    pub fallback: bool,
    pub failed_keys: Vec<String>,
}

/// Cumulative counters over the writer's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub queued: u64,
    pub duplicates: u64,
    pub persisted: u64,
    pub failed: u64,
    pub batches: u64,
    pub fallbacks: u64,
}

pub struct BatchWriter<'s, S: CatalogStore + ?Sized> {
    store: &'s S,
    batch_size: usize,
    pending: Vec<NewRecord>,
    pending_keys: HashSet<String>,
    stats: WriterStats,
}

impl<'s, S: CatalogStore + ?Sized> BatchWriter<'s, S> {
    pub fn new(store: &'s S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            pending_keys: HashSet::with_capacity(batch_size),
            stats: WriterStats::default(),
        }
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queue a record unless its key is already known.
    ///
    /// Errors only when the existence check itself fails; the record is then
    /// not queued.
    pub async fn push(&mut self, record: NewRecord) -> Result<WriteOutcome> {
        if self.pending_keys.contains(record.key())
            || self.store.exists(record.kind(), record.key()).await?
        {
            self.stats.duplicates += 1;
            return Ok(WriteOutcome::Duplicate);
        }

        self.pending_keys.insert(record.key().to_string());
        self.pending.push(record);
        self.stats.queued += 1;

        if self.pending.len() >= self.batch_size {
            let report = self.flush().await;
            return Ok(WriteOutcome::Flushed(report));
        }
        Ok(WriteOutcome::Queued)
    }

    /// Write everything pending: one bulk insert, falling back to per-record
    /// inserts if the bulk insert is rejected.
    pub async fn flush(&mut self) -> FlushReport {
        if self.pending.is_empty() {
            return FlushReport::default();
        }

        let batch = std::mem::take(&mut self.pending);
        self.pending_keys.clear();

        let mut report = FlushReport {
            attempted: batch.len(),
            ..FlushReport::default()
        };

        match self.store.insert_batch(&batch).await {
            Ok(()) => {
                report.persisted = batch.len();
                debug!(records = batch.len(), "batch saved");
            }
            Err(e) => {
                warn!(
                    records = batch.len(),
                    error = %e,
                    "bulk insert failed, saving records individually"
                );
                report.fallback = true;
                for record in &batch {
                    match self.store.insert_one(record).await {
                        Ok(()) => report.persisted += 1,
                        Err(e) => {
                            error!(key = %record.key(), error = %e, "could not save record");
                            report.failed += 1;
                            report.failed_keys.push(record.key().to_string());
                        }
                    }
                }
                warn!(
                    saved = report.persisted,
                    total = batch.len(),
                    "saved records individually"
                );
            }
        }

        self.stats.batches += 1;
        self.stats.persisted += report.persisted as u64;
        self.stats.failed += report.failed as u64;
        if report.fallback {
            self.stats.fallbacks += 1;
        }
        report
    }

    /// Flush the final partial batch and return the run's counters.
    pub async fn finish(mut self) -> WriterStats {
        self.flush().await;
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAuthor, NewBook, RecordKind};
    use crate::store::memory::InMemoryStore;

    fn book(key: &str) -> NewRecord {
        NewRecord::Book(NewBook {
            key: key.to_string(),
            title: format!("Title {}", key),
            description: None,
            subjects: None,
            author: String::new(),
            cover: None,
            first_published: None,
        })
    }

    #[tokio::test]
    async fn flushes_at_batch_size() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(&store, 3);

        assert_eq!(writer.push(book("A")).await.unwrap(), WriteOutcome::Queued);
        assert_eq!(writer.push(book("B")).await.unwrap(), WriteOutcome::Queued);
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 0);

        match writer.push(book("C")).await.unwrap() {
            WriteOutcome::Flushed(report) => {
                assert_eq!(report.persisted, 3);
                assert_eq!(report.failed, 0);
                assert!(!report.fallback);
            }
            other => panic!("expected flush, got {:?}", other),
        }
        assert_eq!(writer.pending(), 0);
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn finish_flushes_partial_batch() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(&store, 10);
        writer.push(book("A")).await.unwrap();
        writer.push(book("B")).await.unwrap();

        let stats = writer.finish().await;
        assert_eq!(stats.persisted, 2);
        assert_eq!(stats.batches, 1);
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stored_keys_are_duplicates() {
        let store = InMemoryStore::new();
        store.insert_one(&book("A")).await.unwrap();

        let mut writer = BatchWriter::new(&store, 10);
        assert_eq!(
            writer.push(book("A")).await.unwrap(),
            WriteOutcome::Duplicate
        );
        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.stats().duplicates, 1);
    }

    #[tokio::test]
    async fn same_run_duplicates_are_not_queued_twice() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(&store, 10);
        writer.push(book("A")).await.unwrap();
        assert_eq!(
            writer.push(book("A")).await.unwrap(),
            WriteOutcome::Duplicate
        );
        assert_eq!(writer.pending(), 1);

        let stats = writer.finish().await;
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.fallbacks, 0);
    }

    #[tokio::test]
    async fn one_conflict_costs_exactly_one_record() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(&store, 5);
        for key in ["A", "B", "C", "D"] {
            writer.push(book(key)).await.unwrap();
        }

        // Another writer sneaks "C" in after it was queued here.
        store.insert_one(&book("C")).await.unwrap();

        let report = match writer.push(book("E")).await.unwrap() {
            WriteOutcome::Flushed(report) => report,
            other => panic!("expected flush, got {:?}", other),
        };
        assert!(report.fallback);
        assert_eq!(report.attempted, 5);
        assert_eq!(report.persisted, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_keys, vec!["C".to_string()]);
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 5);
        assert_eq!(writer.stats().fallbacks, 1);
    }

    #[tokio::test]
    async fn authors_go_through_the_same_path() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(&store, 2);
        let author = |key: &str| {
            NewRecord::Author(NewAuthor {
                key: key.to_string(),
                name: "Name".to_string(),
            })
        };
        writer.push(author("OL1A")).await.unwrap();
        writer.push(author("OL2A")).await.unwrap();
        assert_eq!(store.count(RecordKind::Author).await.unwrap(), 2);
        assert_eq!(
            writer.push(author("OL1A")).await.unwrap(),
            WriteOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn zero_batch_size_is_treated_as_one() {
        let store = InMemoryStore::new();
        let mut writer = BatchWriter::new(&store, 0);
        assert!(matches!(
            writer.push(book("A")).await.unwrap(),
            WriteOutcome::Flushed(_)
        ));
    }
}
