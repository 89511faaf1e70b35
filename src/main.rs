//! # Book club catalog CLI (`catalog`)
//!
//! The `catalog` binary loads the external book dump into the catalog store and
//! keeps it clean.
//!
//! ## Usage
//!
//! ```bash
//! catalog --config ./config/catalog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catalog init` | Create the SQLite database and schema |
//! | `catalog import works [path] [start_line] [batch_size]` | Import work records into `books` |
//! | `catalog import authors [path] [start_line] [batch_size]` | Import author records into `authors` |
//! | `catalog clean [--execute] [--only-*] ...` | Report or delete low-quality books |
//! | `catalog recommend [--limit N]` | Rebuild the recommended books table |
//! | `catalog stats` | Row counts and field coverage |
//!
//! ## Examples
//!
//! ```bash
//! # Import works, resuming at line 2,000,000 with batches of 5,000
//! catalog import works ./data/ol_dump.txt 2000000 5000
//!
//! # See what the cleanup would delete
//! catalog clean
//!
//! # Delete short descriptions only
//! catalog clean --execute --only-short --min-desc=200
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use bookclub_catalog::cleanup::{self, CleanRequest};
use bookclub_catalog::logging::{self, LogLevel};
use bookclub_catalog::models::RecordKind;
use bookclub_catalog::progress::ProgressMode;
use bookclub_catalog::{config, ingest, migrate, recommend, stats};

/// Book club catalog tooling: import the book dump, clean the catalog, and
/// maintain recommendations.
#[derive(Parser)]
#[command(
    name = "catalog",
    about = "Batch import and cleanup tooling for the book club catalog",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catalog.toml")]
    config: PathBuf,

    /// Override `[logging].level` (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database file and schema. Safe to run repeatedly.
    Init,

    /// Stream a dump file into the catalog.
    ///
    /// Lines of the other record type are ignored, so works and authors are
    /// imported in separate passes over the same dump. Records whose key is
    /// already stored are skipped, which makes re-running an import safe.
    Import {
        /// Which record type to import.
        kind: ImportKind,

        /// Dump file. Defaults to `[import].dump_path`.
        path: Option<PathBuf>,

        /// Number of leading lines to skip (resume point).
        start_line: Option<u64>,

        /// Records per insert batch. Defaults to `[import].batch_size`.
        batch_size: Option<usize>,

        /// Progress output: human, json, or off.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Find and optionally delete low-quality books.
    ///
    /// Without `--execute` nothing is deleted; matches are counted and a few
    /// are shown. Without any `--only-*` flag every criterion runs.
    Clean {
        /// Delete matches (asks for confirmation).
        #[arg(long)]
        execute: bool,

        /// Only books whose title is mostly non-Latin.
        #[arg(long)]
        only_non_latin: bool,

        /// Only books without a description.
        #[arg(long)]
        only_empty_desc: bool,

        /// Only books without subjects.
        #[arg(long)]
        only_empty_subj: bool,

        /// Only books with a short description.
        #[arg(long)]
        only_short: bool,

        /// Non-Latin fraction above which a title is flagged.
        #[arg(long)]
        threshold: Option<f64>,

        /// Descriptions shorter than this many characters are short.
        #[arg(long)]
        min_desc: Option<usize>,

        /// Rows per page.
        #[arg(long)]
        batch: Option<usize>,

        /// Reclaim space and refresh statistics after deleting.
        #[arg(long)]
        optimize: bool,

        /// Progress output: human, json, or off.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Rebuild the recommended books table.
    Recommend {
        #[arg(long, default_value_t = recommend::DEFAULT_LIMIT)]
        limit: u32,
    },

    /// Show catalog row counts and field coverage.
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportKind {
    Works,
    Authors,
}

impl From<ImportKind> for RecordKind {
    fn from(kind: ImportKind) -> Self {
        match kind {
            ImportKind::Works => RecordKind::Work,
            ImportKind::Authors => RecordKind::Author,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors exit 1; help and version exit 0.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = config::load_config(&cli.config)?;
    if let Some(level) = cli.log_level {
        cfg.logging.level = level;
    }
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            kind,
            path,
            start_line,
            batch_size,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_import(&cfg, kind.into(), path, start_line, batch_size, progress).await?;
        }
        Commands::Clean {
            execute,
            only_non_latin,
            only_empty_desc,
            only_empty_subj,
            only_short,
            threshold,
            min_desc,
            batch,
            optimize,
            progress,
        } => {
            let request = CleanRequest {
                execute,
                only_non_latin,
                only_empty_desc,
                only_empty_subj,
                only_short,
                threshold,
                min_desc,
                batch,
                optimize,
            };
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            cleanup::run_clean(&cfg, &request, progress).await?;
        }
        Commands::Recommend { limit } => {
            recommend::run_recommend(&cfg, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
