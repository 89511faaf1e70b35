//! Policy-driven catalog cleanup.
//!
//! Each [`Criterion`] is a predicate over a stored book. [`run_criterion`]
//! walks the whole `books` table in id order, one keyset page at a time, and
//! either counts the matches (dry run) or deletes them with one transaction
//! per page. A failed page delete aborts the run; pages committed before it
//! stay committed.

use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::config::{CleanupConfig, Config};
use crate::db;
use crate::migrate;
use crate::models::{BookRow, RecordKind};
use crate::optimize::{optimize_store, OptimizeOutcome};
use crate::progress::{format_number, rate, ProgressEvent, ProgressMode, ProgressReporter};
use crate::sanitize::is_latin_char;
use crate::store::sqlite::SqliteStore;
use crate::store::CatalogStore;

/// Characters that never count towards the non-Latin fraction.
const NEUTRAL_PUNCTUATION: &str = ",.;:!?()[]{}\"'-_/\\";

/// Pages between progress events.
const PROGRESS_EVERY_PAGES: u64 = 5;

pub const CONFIRM_PROMPT: &str = "Are you sure you want to continue? (yes/no): ";

/// Whether more than `threshold` of the meaningful characters of `text` fall
/// outside the Latin ranges. Whitespace, ASCII digits and common punctuation
/// are not meaningful; text with no meaningful characters is never flagged.
/// Other numeric characters such as `⅓` or `Ⅻ` count as non-Latin letters.
pub fn is_mostly_non_latin(text: &str, threshold: f64) -> bool {
    let mut meaningful = 0usize;
    let mut non_latin = 0usize;
    for c in text.chars() {
        if c.is_whitespace() || c.is_ascii_digit() || NEUTRAL_PUNCTUATION.contains(c) {
            continue;
        }
        meaningful += 1;
        if !is_latin_char(c) {
            non_latin += 1;
        }
    }
    meaningful > 0 && (non_latin as f64 / meaningful as f64) > threshold
}

fn is_blank(field: Option<&str>) -> bool {
    field.map_or(true, str::is_empty)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    NonLatinTitle { threshold: f64 },
    EmptyDescription,
    EmptySubjects,
    /// Non-empty description shorter than `min_len` characters.
    ShortDescription { min_len: usize },
}

impl Criterion {
    pub fn name(&self) -> &'static str {
        match self {
            Criterion::NonLatinTitle { .. } => "non-latin-title",
            Criterion::EmptyDescription => "empty-description",
            Criterion::EmptySubjects => "empty-subjects",
            Criterion::ShortDescription { .. } => "short-description",
        }
    }

    pub fn matches(&self, row: &BookRow) -> bool {
        match *self {
            Criterion::NonLatinTitle { threshold } => is_mostly_non_latin(&row.title, threshold),
            Criterion::EmptyDescription => is_blank(row.description.as_deref()),
            Criterion::EmptySubjects => is_blank(row.subjects.as_deref()),
            Criterion::ShortDescription { min_len } => match row.description.as_deref() {
                Some(desc) if !desc.is_empty() => desc.chars().count() < min_len,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub dry_run: bool,
    /// Rows per keyset page.
    pub batch_size: usize,
    /// Matches kept as a preview in dry-run mode.
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriterionReport {
    pub criterion: Criterion,
    pub scanned: u64,
    pub matched: u64,
    pub deleted: u64,
    pub elapsed: Duration,
    /// `(id, title)` of the first matches; dry run only.
    pub samples: Vec<(i64, String)>,
}

/// Apply one criterion to the whole catalog.
pub async fn run_criterion<S: CatalogStore + ?Sized>(
    store: &S,
    criterion: Criterion,
    options: &CleanupOptions,
    reporter: &dyn ProgressReporter,
) -> Result<CriterionReport> {
    let started = Instant::now();
    let total = store.count(RecordKind::Work).await?.max(0) as u64;
    let page_size = options.batch_size.max(1);

    info!(
        criterion = criterion.name(),
        dry_run = options.dry_run,
        total,
        "starting cleanup pass"
    );

    let mut report = CriterionReport {
        criterion,
        scanned: 0,
        matched: 0,
        deleted: 0,
        elapsed: Duration::ZERO,
        samples: Vec::new(),
    };
    let mut last_id = 0i64;
    let mut pages = 0u64;

    loop {
        let page = store
            .fetch_books_page(last_id, page_size)
            .await
            .with_context(|| {
                format!("{}: failed to read page after id {}", criterion.name(), last_id)
            })?;
        let Some(last) = page.last() else {
            break;
        };
        let page_start = last_id;
        last_id = last.id;
        report.scanned += page.len() as u64;

        let mut ids = Vec::new();
        for row in page.iter().filter(|row| criterion.matches(row)) {
            ids.push(row.id);
            if options.dry_run && report.samples.len() < options.sample_size {
                report.samples.push((row.id, row.title.clone()));
            }
        }
        report.matched += ids.len() as u64;

        if !options.dry_run && !ids.is_empty() {
            let deleted = store.delete_books(&ids).await.with_context(|| {
                format!(
                    "{}: failed to delete page of ids {}..={} ({} rows deleted before this page)",
                    criterion.name(),
                    page_start + 1,
                    last_id,
                    report.deleted
                )
            })?;
            if deleted != ids.len() as u64 {
                warn!(
                    criterion = criterion.name(),
                    expected = ids.len(),
                    deleted,
                    "page delete removed fewer rows than matched"
                );
            }
            report.deleted += deleted;
            info!(criterion = criterion.name(), deleted, "deleted page");
        }

        pages += 1;
        if pages % PROGRESS_EVERY_PAGES == 0 {
            reporter.report(ProgressEvent::Cleaning {
                criterion: criterion.name().to_string(),
                scanned: report.scanned,
                total,
                matched: report.matched,
                rows_per_sec: rate(report.scanned, started.elapsed()),
            });
        }
    }

    report.elapsed = started.elapsed();
    info!(
        criterion = criterion.name(),
        matched = report.matched,
        deleted = report.deleted,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "cleanup pass complete"
    );
    Ok(report)
}

/// Run several criteria one after another over the same store.
pub async fn clean_catalog<S: CatalogStore + ?Sized>(
    store: &S,
    criteria: &[Criterion],
    options: &CleanupOptions,
    reporter: &dyn ProgressReporter,
) -> Result<Vec<CriterionReport>> {
    let mut reports = Vec::with_capacity(criteria.len());
    for criterion in criteria {
        reports.push(run_criterion(store, *criterion, options, reporter).await?);
    }
    Ok(reports)
}

/// Read a typed confirmation. Only `yes` (any case) confirms.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{}", CONFIRM_PROMPT)?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

/// What `catalog clean` was asked to do.
#[derive(Debug, Clone, Default)]
pub struct CleanRequest {
    pub execute: bool,
    pub only_non_latin: bool,
    pub only_empty_desc: bool,
    pub only_empty_subj: bool,
    pub only_short: bool,
    pub threshold: Option<f64>,
    pub min_desc: Option<usize>,
    pub batch: Option<usize>,
    pub optimize: bool,
}

impl CleanRequest {
    /// No `--only-*` flag selects every criterion.
    pub fn runs_all(&self) -> bool {
        !(self.only_non_latin || self.only_empty_desc || self.only_empty_subj || self.only_short)
    }

    pub fn criteria(&self, defaults: &CleanupConfig) -> Result<Vec<Criterion>> {
        let threshold = self.threshold.unwrap_or(defaults.threshold);
        if !(0.0..=1.0).contains(&threshold) {
            bail!("Invalid threshold value: {} (expected 0.0 to 1.0)", threshold);
        }
        let min_len = self.min_desc.unwrap_or(defaults.min_desc_length);
        if min_len == 0 {
            bail!("Invalid minimum description length: must be > 0");
        }

        let all = self.runs_all();
        let mut criteria = Vec::new();
        if all || self.only_non_latin {
            criteria.push(Criterion::NonLatinTitle { threshold });
        }
        if all || self.only_empty_desc {
            criteria.push(Criterion::EmptyDescription);
        }
        if all || self.only_empty_subj {
            criteria.push(Criterion::EmptySubjects);
        }
        if all || self.only_short {
            criteria.push(Criterion::ShortDescription { min_len });
        }
        Ok(criteria)
    }

    pub fn should_optimize(&self) -> bool {
        self.execute && (self.optimize || self.runs_all())
    }
}

pub async fn run_clean(config: &Config, request: &CleanRequest, progress: ProgressMode) -> Result<()> {
    let criteria = request.criteria(&config.cleanup)?;
    let batch_size = request.batch.unwrap_or(config.cleanup.batch_size);
    if batch_size == 0 {
        bail!("Invalid batch size: must be > 0");
    }
    let options = CleanupOptions {
        dry_run: !request.execute,
        batch_size,
        sample_size: config.cleanup.sample_size,
    };

    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;
    let store = SqliteStore::new(pool);
    let before = store.count(RecordKind::Work).await?;

    if options.dry_run {
        eprintln!("Running in DRY RUN mode. No deletions will be performed.");
        eprintln!("Add --execute to perform actual deletions.");
    } else {
        eprintln!("CAUTION: running in EXECUTE mode. Matching books will be permanently deleted.");
        let stdin = std::io::stdin();
        let confirmed = confirm(&mut stdin.lock(), &mut std::io::stderr())
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Aborted.");
            store.pool().close().await;
            return Ok(());
        }
    }

    let started = Instant::now();
    let reporter = progress.reporter();
    let reports = clean_catalog(&store, &criteria, &options, reporter.as_ref()).await?;

    let verb = if options.dry_run { "would delete" } else { "deleted" };
    println!("clean ({})", if options.dry_run { "dry run" } else { "execute" });
    println!("  engine: {}", store.engine().name());
    println!("  books before: {}", format_number(before as u64));
    let mut total = 0u64;
    for report in &reports {
        let count = if options.dry_run { report.matched } else { report.deleted };
        total += count;
        println!(
            "  {}: {} {} ({:.1}s)",
            report.criterion.name(),
            verb,
            format_number(count),
            report.elapsed.as_secs_f64()
        );
        for (id, title) in &report.samples {
            println!("    sample: id={} title='{}'", id, title);
        }
    }
    println!("  total: {} {}", verb, format_number(total));

    if request.should_optimize() {
        match optimize_store(&store).await? {
            OptimizeOutcome::Applied { engine, statements } => {
                println!("  optimize: {} ({} statements)", engine, statements)
            }
            OptimizeOutcome::Unsupported { engine } => {
                println!("  optimize: not available for {}", engine)
            }
        }
    }

    let remaining = store.count(RecordKind::Work).await?;
    println!("  elapsed: {:.2}s", started.elapsed().as_secs_f64());
    println!("  books remaining: {}", format_number(remaining as u64));
    println!("ok");

    store.pool().close().await;
    Ok(())
}
