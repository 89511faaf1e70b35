//! Catalog statistics.
//!
//! A quick health summary of the store: row counts per table, how many books
//! carry each optional field, and the database file size. Used by
//! `catalog stats` after an import or cleanup to confirm what landed.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::progress::format_number;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub books: i64,
    pub authors: i64,
    pub recommended: i64,
    pub with_description: i64,
    pub with_subjects: i64,
    pub with_cover: i64,
    pub with_first_published: i64,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<CatalogStats> {
    let coverage = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS books,
            COUNT(CASE WHEN description IS NOT NULL AND description != '' THEN 1 END) AS with_description,
            COUNT(CASE WHEN subjects IS NOT NULL AND subjects != '' THEN 1 END) AS with_subjects,
            COUNT(cover) AS with_cover,
            COUNT(first_published) AS with_first_published
        FROM books
        "#,
    )
    .fetch_one(pool)
    .await?;

    let authors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
        .fetch_one(pool)
        .await?;
    let recommended: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recommended_books")
        .fetch_one(pool)
        .await?;

    Ok(CatalogStats {
        books: coverage.get("books"),
        authors,
        recommended,
        with_description: coverage.get("with_description"),
        with_subjects: coverage.get("with_subjects"),
        with_cover: coverage.get("with_cover"),
        with_first_published: coverage.get("with_first_published"),
    })
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("stats");
    println!("  database: {}", config.db.path.display());
    println!("  size: {}", format_bytes(db_size));
    println!("  books: {}", format_number(stats.books as u64));
    println!("  authors: {}", format_number(stats.authors as u64));
    println!("  recommended: {}", format_number(stats.recommended as u64));
    for (field, count) in [
        ("description", stats.with_description),
        ("subjects", stats.with_subjects),
        ("cover", stats.with_cover),
        ("first_published", stats.with_first_published),
    ] {
        println!(
            "  with {}: {} ({}%)",
            field,
            format_number(count as u64),
            percent(count, stats.books)
        );
    }

    pool.close().await;
    Ok(())
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        (part * 100) / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn percent_of_empty_table_is_zero() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
    }

    #[tokio::test]
    async fn counts_field_coverage() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("s.sqlite").display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO books (key, title, description, subjects, cover, first_published) VALUES
                ('A', 'One', 'desc', 'Fiction', 5, 1915),
                ('B', 'Two', '', NULL, NULL, NULL),
                ('C', 'Three', NULL, 'Poetry', NULL, 2001)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO authors (key, name) VALUES ('OL1A', 'Franz Kafka')")
            .execute(&pool)
            .await
            .unwrap();

        let stats = collect_stats(&pool).await.unwrap();
        assert_eq!(
            stats,
            CatalogStats {
                books: 3,
                authors: 1,
                recommended: 0,
                with_description: 1,
                with_subjects: 2,
                with_cover: 1,
                with_first_published: 2,
            }
        );
    }
}
