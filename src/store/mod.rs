//! Storage abstraction for the catalog.
//!
//! The [`CatalogStore`] trait covers every store operation the ingestion and
//! cleanup pipelines need, so both can run against SQLite in production and an
//! in-memory store in tests.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`exists`](CatalogStore::exists) | Natural-key existence check |
//! | [`insert_batch`](CatalogStore::insert_batch) | All-or-nothing bulk insert |
//! | [`insert_one`](CatalogStore::insert_one) | Single insert (batch fallback path) |
//! | [`fetch_books_page`](CatalogStore::fetch_books_page) | Keyset page over `books` by id |
//! | [`delete_books`](CatalogStore::delete_books) | Transactional delete by id |
//! | [`count`](CatalogStore::count) | Row count per table |
//! | [`run_maintenance`](CatalogStore::run_maintenance) | Engine-specific maintenance |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{BookRow, NewRecord, RecordKind};
use crate::optimize::StoreEngine;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Whether a row with this natural key already exists.
    async fn exists(&self, kind: RecordKind, key: &str) -> Result<bool>;

    /// Insert every record or none of them.
    ///
    /// Fails as a whole when any record violates a constraint.
    async fn insert_batch(&self, records: &[NewRecord]) -> Result<()>;

    async fn insert_one(&self, record: &NewRecord) -> Result<()>;

    /// Up to `limit` books with `id > after_id`, in id order.
    async fn fetch_books_page(&self, after_id: i64, limit: usize) -> Result<Vec<BookRow>>;

    /// Delete the given books in one transaction; returns rows removed.
    async fn delete_books(&self, ids: &[i64]) -> Result<u64>;

    async fn count(&self, kind: RecordKind) -> Result<i64>;

    fn engine(&self) -> StoreEngine;

    async fn run_maintenance(&self, statements: &[&str]) -> Result<()>;
}
