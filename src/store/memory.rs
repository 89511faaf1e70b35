//! In-memory [`CatalogStore`] implementation for tests.
//!
//! Tables live in `BTreeMap`s behind a `std::sync::RwLock`. Inserts enforce the
//! same natural-key uniqueness as the SQLite schema, and batch inserts are
//! all-or-nothing.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{BookRow, NewAuthor, NewBook, NewRecord, RecordKind};
use crate::optimize::StoreEngine;

use super::CatalogStore;

#[derive(Default)]
struct Tables {
    next_id: i64,
    books: BTreeMap<i64, NewBook>,
    book_keys: HashSet<String>,
    authors: BTreeMap<i64, NewAuthor>,
    author_keys: HashSet<String>,
}

impl Tables {
    fn has_key(&self, kind: RecordKind, key: &str) -> bool {
        match kind {
            RecordKind::Work => self.book_keys.contains(key),
            RecordKind::Author => self.author_keys.contains(key),
        }
    }

    fn insert(&mut self, record: &NewRecord) {
        self.next_id += 1;
        match record {
            NewRecord::Book(b) => {
                self.book_keys.insert(b.key.clone());
                self.books.insert(self.next_id, b.clone());
            }
            NewRecord::Author(a) => {
                self.author_keys.insert(a.key.clone());
                self.authors.insert(self.next_id, a.clone());
            }
        }
    }
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_deletes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Make every following `delete_books` call fail without deleting anything.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// All stored books, in id order.
    pub fn books(&self) -> Vec<NewBook> {
        self.tables.read().unwrap().books.values().cloned().collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn exists(&self, kind: RecordKind, key: &str) -> Result<bool> {
        Ok(self.tables.read().unwrap().has_key(kind, key))
    }

    async fn insert_batch(&self, records: &[NewRecord]) -> Result<()> {
        let mut tables = self.tables.write().unwrap();

        let mut seen: HashSet<(RecordKind, &str)> = HashSet::new();
        for record in records {
            let kind = record.kind();
            if tables.has_key(kind, record.key()) || !seen.insert((kind, record.key())) {
                bail!("UNIQUE constraint failed: {}.key", kind.table());
            }
        }

        for record in records {
            tables.insert(record);
        }
        Ok(())
    }

    async fn insert_one(&self, record: &NewRecord) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        if tables.has_key(record.kind(), record.key()) {
            bail!("UNIQUE constraint failed: {}.key", record.kind().table());
        }
        tables.insert(record);
        Ok(())
    }

    async fn fetch_books_page(&self, after_id: i64, limit: usize) -> Result<Vec<BookRow>> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .books
            .range(after_id + 1..)
            .take(limit)
            .map(|(id, b)| BookRow {
                id: *id,
                title: b.title.clone(),
                description: b.description.clone(),
                subjects: b.subjects.clone(),
            })
            .collect())
    }

    async fn delete_books(&self, ids: &[i64]) -> Result<u64> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("simulated delete failure");
        }
        let mut tables = self.tables.write().unwrap();
        let mut deleted = 0u64;
        for id in ids {
            if let Some(book) = tables.books.remove(id) {
                tables.book_keys.remove(&book.key);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn count(&self, kind: RecordKind) -> Result<i64> {
        let tables = self.tables.read().unwrap();
        let n = match kind {
            RecordKind::Work => tables.books.len(),
            RecordKind::Author => tables.authors.len(),
        };
        Ok(n as i64)
    }

    fn engine(&self) -> StoreEngine {
        StoreEngine::Other("memory".to_string())
    }

    async fn run_maintenance(&self, _statements: &[&str]) -> Result<()> {
        Ok(())
    }
}
