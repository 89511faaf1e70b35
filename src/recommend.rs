//! Rebuild of the `recommended_books` table.
//!
//! The table holds a random selection of catalog rows that are complete enough
//! to show: description, cover, title and author all present. An empty
//! `author` (`''`, stored for works without an author reference) counts as
//! absent.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::migrate;

pub const DEFAULT_LIMIT: u32 = 400;

/// Replace the recommendations with up to `limit` random quality books.
/// Clearing and refilling happen in one transaction.
pub async fn refresh_recommendations(pool: &SqlitePool, limit: u32) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let cleared = sqlx::query("DELETE FROM recommended_books")
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let inserted = sqlx::query(
        r#"
        INSERT INTO recommended_books (book_id, title, author, cover, first_published)
        SELECT id, title, author, cover, first_published
        FROM books
        WHERE description IS NOT NULL
          AND description != ''
          AND cover IS NOT NULL
          AND title != ''
          AND author != ''
        ORDER BY RANDOM()
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    info!(cleared, inserted, "recommendations refreshed");
    Ok(inserted)
}

pub async fn run_recommend(config: &Config, limit: u32) -> Result<()> {
    if limit == 0 {
        bail!("limit must be > 0");
    }
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;

    let inserted = refresh_recommendations(&pool, limit)
        .await
        .context("Failed to refresh recommended books")?;

    println!("recommend");
    println!("  limit: {}", limit);
    println!("  recommended: {}", inserted);
    println!("ok");

    pool.close().await;
    Ok(())
}
