//! SQLite-backed [`CatalogStore`] implementation.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::models::{BookRow, NewAuthor, NewBook, NewRecord, RecordKind};
use crate::optimize::StoreEngine;

use super::CatalogStore;

/// Rows per multi-row INSERT / ids per DELETE, well under SQLite's bind limit.
const ROWS_PER_STATEMENT: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn push_books<'a>(qb: &mut QueryBuilder<'a, Sqlite>, books: &[&'a NewBook]) {
    qb.push(
        "INSERT INTO books (key, title, description, subjects, author, cover, first_published) ",
    );
    qb.push_values(books.iter().copied(), |mut b, book| {
        b.push_bind(book.key.as_str())
            .push_bind(book.title.as_str())
            .push_bind(book.description.as_deref())
            .push_bind(book.subjects.as_deref())
            .push_bind(book.author.as_str())
            .push_bind(book.cover)
            .push_bind(book.first_published);
    });
}

fn push_authors<'a>(qb: &mut QueryBuilder<'a, Sqlite>, authors: &[&'a NewAuthor]) {
    qb.push("INSERT INTO authors (key, name) ");
    qb.push_values(authors.iter().copied(), |mut b, author| {
        b.push_bind(author.key.as_str()).push_bind(author.name.as_str());
    });
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn exists(&self, kind: RecordKind, key: &str) -> Result<bool> {
        let sql = format!("SELECT COUNT(*) > 0 FROM {} WHERE key = ?", kind.table());
        let found: bool = sqlx::query_scalar(&sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    async fn insert_batch(&self, records: &[NewRecord]) -> Result<()> {
        let mut books = Vec::new();
        let mut authors = Vec::new();
        for record in records {
            match record {
                NewRecord::Book(b) => books.push(b),
                NewRecord::Author(a) => authors.push(a),
            }
        }

        let mut tx = self.pool.begin().await?;

        for chunk in books.chunks(ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::new("");
            push_books(&mut qb, chunk);
            qb.build().execute(&mut *tx).await?;
        }
        for chunk in authors.chunks(ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::new("");
            push_authors(&mut qb, chunk);
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_one(&self, record: &NewRecord) -> Result<()> {
        match record {
            NewRecord::Book(book) => {
                sqlx::query(
                    r#"
                    INSERT INTO books (key, title, description, subjects, author, cover, first_published)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&book.key)
                .bind(&book.title)
                .bind(&book.description)
                .bind(&book.subjects)
                .bind(&book.author)
                .bind(book.cover)
                .bind(book.first_published)
                .execute(&self.pool)
                .await?;
            }
            NewRecord::Author(author) => {
                sqlx::query("INSERT INTO authors (key, name) VALUES (?, ?)")
                    .bind(&author.key)
                    .bind(&author.name)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn fetch_books_page(&self, after_id: i64, limit: usize) -> Result<Vec<BookRow>> {
        let rows = sqlx::query(
            "SELECT id, title, description, subjects FROM books WHERE id > ? ORDER BY id LIMIT ?",
        )
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| BookRow {
                id: row.get("id"),
                title: row.get("title"),
                description: row.get("description"),
                subjects: row.get("subjects"),
            })
            .collect())
    }

    async fn delete_books(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;

        for chunk in ids.chunks(ROWS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM recommended_books WHERE book_id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            qb.build().execute(&mut *tx).await?;

            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM books WHERE id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            deleted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn count(&self, kind: RecordKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n)
    }

    fn engine(&self) -> StoreEngine {
        StoreEngine::Sqlite
    }

    async fn run_maintenance(&self, statements: &[&str]) -> Result<()> {
        for statement in statements {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let raw = format!("[db]\npath = \"{}\"\n", tmp.path().join("t.sqlite").display());
        let config: Config = toml::from_str(&raw).unwrap();
        let pool = db::connect(&config).await.unwrap();
        migrate::create_schema(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn book(key: &str, title: &str) -> NewRecord {
        NewRecord::Book(NewBook {
            key: key.to_string(),
            title: title.to_string(),
            description: Some("A description".to_string()),
            subjects: None,
            author: "OL1A".to_string(),
            cover: Some(7),
            first_published: Some(1915),
        })
    }

    #[tokio::test]
    async fn batch_insert_and_exists() {
        let (_tmp, store) = test_store().await;
        store
            .insert_batch(&[book("OL1W", "One"), book("OL2W", "Two")])
            .await
            .unwrap();

        assert!(store.exists(RecordKind::Work, "OL1W").await.unwrap());
        assert!(!store.exists(RecordKind::Work, "OL3W").await.unwrap());
        assert!(!store.exists(RecordKind::Author, "OL1W").await.unwrap());
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn batch_with_duplicate_key_inserts_nothing() {
        let (_tmp, store) = test_store().await;
        store.insert_one(&book("OL1W", "One")).await.unwrap();

        let result = store
            .insert_batch(&[book("OL2W", "Two"), book("OL1W", "Again")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn large_batch_spans_statements() {
        let (_tmp, store) = test_store().await;
        let records: Vec<NewRecord> = (0..1200)
            .map(|i| book(&format!("OL{}W", i), "Title"))
            .collect();
        store.insert_batch(&records).await.unwrap();
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn pages_and_deletes_by_id() {
        let (_tmp, store) = test_store().await;
        let records: Vec<NewRecord> = (0..10)
            .map(|i| book(&format!("OL{}W", i), &format!("Title {}", i)))
            .collect();
        store.insert_batch(&records).await.unwrap();

        let first = store.fetch_books_page(0, 4).await.unwrap();
        assert_eq!(first.len(), 4);
        let last_id = first.last().unwrap().id;
        let second = store.fetch_books_page(last_id, 4).await.unwrap();
        assert!(second.iter().all(|row| row.id > last_id));

        let ids: Vec<i64> = first.iter().map(|row| row.id).collect();
        assert_eq!(store.delete_books(&ids).await.unwrap(), 4);
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 6);
        assert_eq!(store.delete_books(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn maintenance_runs_on_sqlite() {
        let (_tmp, store) = test_store().await;
        let outcome = crate::optimize::optimize_store(&store).await.unwrap();
        assert_eq!(
            outcome,
            crate::optimize::OptimizeOutcome::Applied {
                engine: "sqlite".to_string(),
                statements: 3
            }
        );
    }

    #[tokio::test]
    async fn authors_round_trip() {
        let (_tmp, store) = test_store().await;
        let author = NewRecord::Author(NewAuthor {
            key: "OL1A".to_string(),
            name: "Franz Kafka".to_string(),
        });
        store.insert_batch(&[author.clone()]).await.unwrap();
        assert!(store.exists(RecordKind::Author, "OL1A").await.unwrap());
        assert!(store.insert_one(&author).await.is_err());
    }
}
