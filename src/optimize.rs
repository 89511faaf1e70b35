//! Post-cleanup store maintenance.
//!
//! After deletions the backing store is asked to reclaim space and refresh its
//! planner statistics. The statements depend on the engine; engines without a
//! known recipe are skipped with a notice. Skipping is always safe.

use anyhow::Result;
use tracing::info;

use crate::store::CatalogStore;

/// Backing engine of a [`CatalogStore`].
///
/// Only `Sqlite` and `Other` are produced by the stores in this crate.
/// `Postgres` and `Mysql` name the engines the catalog also runs on in the
/// web application, so their maintenance recipes are kept alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEngine {
    Sqlite,
    Postgres,
    Mysql,
    Other(String),
}

impl StoreEngine {
    pub fn name(&self) -> &str {
        match self {
            StoreEngine::Sqlite => "sqlite",
            StoreEngine::Postgres => "postgresql",
            StoreEngine::Mysql => "mysql",
            StoreEngine::Other(name) => name,
        }
    }
}

const SQLITE_MAINTENANCE: &[&str] = &["VACUUM", "PRAGMA optimize", "ANALYZE"];
const POSTGRES_MAINTENANCE: &[&str] = &["VACUUM ANALYZE books"];
const MYSQL_MAINTENANCE: &[&str] = &["OPTIMIZE TABLE books"];

/// Maintenance statements for `engine`, or `None` when there is no recipe.
pub fn maintenance_statements(engine: &StoreEngine) -> Option<&'static [&'static str]> {
    match engine {
        StoreEngine::Sqlite => Some(SQLITE_MAINTENANCE),
        StoreEngine::Postgres => Some(POSTGRES_MAINTENANCE),
        StoreEngine::Mysql => Some(MYSQL_MAINTENANCE),
        StoreEngine::Other(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeOutcome {
    Applied { engine: String, statements: usize },
    Unsupported { engine: String },
}

pub async fn optimize_store<S: CatalogStore + ?Sized>(store: &S) -> Result<OptimizeOutcome> {
    let engine = store.engine();
    match maintenance_statements(&engine) {
        Some(statements) => {
            info!(engine = engine.name(), "optimizing store");
            store.run_maintenance(statements).await?;
            Ok(OptimizeOutcome::Applied {
                engine: engine.name().to_string(),
                statements: statements.len(),
            })
        }
        None => {
            info!(engine = engine.name(), "no optimization available for engine");
            Ok(OptimizeOutcome::Unsupported {
                engine: engine.name().to_string(),
            })
        }
    }
}
