use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Version of the schema this build reads and writes.
pub const SCHEMA_VERSION: i64 = 1;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT version FROM schema_meta WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    if let Some(version) = existing {
        if version != SCHEMA_VERSION {
            bail!(
                "Database schema version {} does not match supported version {}",
                version,
                SCHEMA_VERSION
            );
        }
    }

    // Catalog entries
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL CHECK (length(title) <= 255),
            description TEXT,
            subjects TEXT,
            author TEXT NOT NULL DEFAULT '',
            cover INTEGER CHECK (cover IS NULL OR cover > 0),
            first_published INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recommended_books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            cover INTEGER,
            first_published INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_author ON books(author)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recommended_books_book_id ON recommended_books(book_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_meta (id, version) VALUES (1, ?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

/// Refuse to run against a database that was never initialized or was
/// created by a different schema version.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let meta_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_meta'",
    )
    .fetch_one(pool)
    .await?;
    if !meta_exists {
        bail!("Database is not initialized. Run `catalog init` first.");
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM schema_meta WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(v) => bail!(
            "Database schema version {} does not match supported version {}",
            v,
            SCHEMA_VERSION
        ),
        None => bail!("Database is not initialized. Run `catalog init` first."),
    }
}
