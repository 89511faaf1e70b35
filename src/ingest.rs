//! Dump ingestion pipeline orchestration.
//!
//! Streams a dump file line by line (never holding more than one line and one
//! pending batch in memory) and drives each line through extraction → Latin
//! sanitizing → the deduplicating batch writer. Per-line failures are counted
//! and skipped; only an unreadable input file or an unreachable store stops
//! the run.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db;
use crate::extract::{decode_line, extract_line, Extracted};
use crate::migrate;
use crate::models::{NewRecord, RecordKind};
use crate::progress::{format_number, rate, ProgressEvent, ProgressMode, ProgressReporter};
use crate::store::sqlite::SqliteStore;
use crate::store::CatalogStore;
use crate::writer::{BatchWriter, WriteOutcome};

const READ_BUFFER_BYTES: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub path: PathBuf,
    pub kind: RecordKind,
    /// Number of leading lines to skip before processing.
    pub start_line: u64,
    pub batch_size: usize,
    /// Lines between progress events.
    pub progress_every: u64,
}

/// Counters for one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Lines read after the skipped prefix.
    pub lines: u64,
    /// Lines carrying the target record type.
    pub processed: u64,
    pub imported: u64,
    pub duplicates: u64,
    /// Target-type lines discarded without error (too few fields, no key/title).
    pub skipped: u64,
    /// Records the store refused even individually.
    pub failed: u64,
    /// Lines that could not be decoded, parsed, or checked against the store.
    pub errors: u64,
    pub elapsed: Duration,
}

/// Run one import pass over `options.path` into `store`.
pub async fn ingest_file<S: CatalogStore + ?Sized>(
    store: &S,
    options: &IngestOptions,
    reporter: &dyn ProgressReporter,
) -> Result<IngestSummary> {
    let file = tokio::fs::File::open(&options.path)
        .await
        .with_context(|| format!("Failed to open data file: {}", options.path.display()))?;
    let reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
    ingest_reader(store, reader, options, reporter).await
}

/// Run one import pass over an already opened dump. A read error stops the
/// pass after the pending batch has been written.
pub async fn ingest_reader<S, R>(
    store: &S,
    mut reader: R,
    options: &IngestOptions,
    reporter: &dyn ProgressReporter,
) -> Result<IngestSummary>
where
    S: CatalogStore + ?Sized,
    R: AsyncBufRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(64 * 1024);

    let started = Instant::now();
    let mut summary = IngestSummary::default();
    let mut writer = BatchWriter::new(store, options.batch_size);
    let progress_every = options.progress_every.max(1);
    let tag = options.kind.type_tag().as_bytes();

    if options.start_line > 0 {
        info!(start_line = options.start_line, "skipping to start line");
        for _ in 0..options.start_line {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
        }
    }

    loop {
        buf.clear();
        let n = match reader.read_until(b'\n', &mut buf).await {
            Ok(n) => n,
            Err(e) => {
                let stats = writer.finish().await;
                error!(
                    line = options.start_line + summary.lines,
                    persisted = stats.persisted,
                    failed = stats.failed,
                    "read failed, pending batch written before stopping"
                );
                return Err(e).with_context(|| {
                    format!("Failed to read data file: {}", options.path.display())
                });
            }
        };
        if n == 0 {
            break;
        }

        let line_number = options.start_line + summary.lines;
        summary.lines += 1;

        if buf.starts_with(tag) {
            summary.processed += 1;
            if let Some(record) = prepare_record(&buf, line_number, &mut summary) {
                match writer.push(record).await {
                    Ok(WriteOutcome::Flushed(report)) => {
                        info!(
                            saved = report.persisted,
                            failed = report.failed,
                            total = writer.stats().persisted,
                            line = line_number,
                            "batch written"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        summary.errors += 1;
                        warn!(line = line_number, error = %e, "failed to queue record");
                    }
                }
            }
        }

        if summary.lines % progress_every == 0 {
            reporter.report(ProgressEvent::Importing {
                kind: options.kind.label().to_string(),
                lines: summary.lines,
                processed: summary.processed,
                imported: writer.stats().persisted,
                errors: summary.errors,
                lines_per_sec: rate(summary.lines, started.elapsed()),
            });
        }
    }

    let stats = writer.finish().await;
    summary.imported = stats.persisted;
    summary.duplicates = stats.duplicates;
    summary.failed = stats.failed;
    summary.elapsed = started.elapsed();

    info!(
        lines = summary.lines,
        processed = summary.processed,
        imported = summary.imported,
        errors = summary.errors,
        "import complete"
    );
    Ok(summary)
}

/// Extract and sanitize one target-type line. Counts the line as an error or
/// a skip when it yields nothing to write.
fn prepare_record(raw: &[u8], line_number: u64, summary: &mut IngestSummary) -> Option<NewRecord> {
    let extracted = decode_line(raw).and_then(extract_line);
    match extracted {
        Ok(Extracted::Work(work)) => match work.sanitize() {
            Some(book) => Some(NewRecord::Book(book)),
            None => {
                summary.skipped += 1;
                debug!(line = line_number, "title empty after sanitizing");
                None
            }
        },
        Ok(Extracted::Author(author)) => Some(NewRecord::Author(author.into_new_author())),
        Ok(Extracted::Skip(reason)) => {
            summary.skipped += 1;
            debug!(line = line_number, reason = ?reason, "skipping line");
            None
        }
        Err(e) => {
            summary.errors += 1;
            warn!(line = line_number, error = %e, "invalid line");
            None
        }
    }
}

/// Resolve the dump path from the CLI or config and check it exists.
pub fn resolve_dump_path(cli_path: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    let Some(path) = cli_path.or_else(|| config.import.dump_path.clone()) else {
        bail!(
            "No data file given.\nUsage: catalog import <works|authors> <data_file_path> [start_line] [batch_size]"
        );
    };
    if !Path::new(&path).exists() {
        bail!("Data file '{}' not found.", path.display());
    }
    Ok(path)
}

pub async fn run_import(
    config: &Config,
    kind: RecordKind,
    path: Option<PathBuf>,
    start_line: Option<u64>,
    batch_size: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let path = resolve_dump_path(path, config)?;
    let batch_size = batch_size.unwrap_or(config.import.batch_size);
    if batch_size == 0 {
        bail!("batch size must be > 0");
    }

    let options = IngestOptions {
        path,
        kind,
        start_line: start_line.unwrap_or(0),
        batch_size,
        progress_every: config.import.progress_every,
    };

    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;
    let store = SqliteStore::new(pool);

    info!(
        kind = kind.label(),
        data_file = %options.path.display(),
        start_line = options.start_line,
        batch_size = options.batch_size,
        "starting import"
    );

    let reporter = progress.reporter();
    let summary = ingest_file(&store, &options, reporter.as_ref()).await?;

    println!("import {}", kind.label());
    println!("  data file: {}", options.path.display());
    println!("  start line: {}", options.start_line);
    println!("  batch size: {}", options.batch_size);
    println!("  lines read: {}", format_number(summary.lines));
    println!("  records processed: {}", format_number(summary.processed));
    println!("  imported: {}", format_number(summary.imported));
    println!("  duplicates: {}", format_number(summary.duplicates));
    println!("  skipped: {}", format_number(summary.skipped));
    println!("  failed: {}", format_number(summary.failed));
    println!("  errors: {}", format_number(summary.errors));
    println!("  elapsed: {:.2}s", summary.elapsed.as_secs_f64());
    println!("ok");

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::store::memory::InMemoryStore;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn work(key: &str, title: &str) -> String {
        format!(
            "/type/work\t/works/{key}\t1\t2010-01-01T00:00:00\t{{\"key\":\"/works/{key}\",\"title\":\"{title}\",\"description\":\"About {title}\"}}\n"
        )
    }

    fn author(key: &str, name: &str) -> String {
        format!(
            "/type/author\t/authors/{key}\t1\t2010-01-01T00:00:00\t{{\"key\":\"/authors/{key}\",\"name\":\"{name}\"}}\n"
        )
    }

    fn dump(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            file.write_all(line.as_bytes()).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn options(file: &NamedTempFile, kind: RecordKind, start_line: u64) -> IngestOptions {
        IngestOptions {
            path: file.path().to_path_buf(),
            kind,
            start_line,
            batch_size: 2,
            progress_every: 1,
        }
    }

    #[tokio::test]
    async fn imports_scenario_line() {
        let file = dump(&[
            "/type/work\t/works/OL1W\t3\t2010-01-01T00:00:00\t{\"key\":\"/works/OL1W\",\"title\":\"Die Verwandlung\",\"authors\":[{\"author\":{\"key\":\"/authors/OL1A\"}}],\"covers\":[55],\"first_publish_date\":\"1915\"}\n".to_string(),
        ]);
        let store = InMemoryStore::new();
        let summary = ingest_file(&store, &options(&file, RecordKind::Work, 0), &NoProgress)
            .await
            .unwrap();

        assert_eq!(summary.imported, 1);
        let books = store.books();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].key, "OL1W");
        assert_eq!(books[0].title, "Die Verwandlung");
        assert_eq!(books[0].author, "OL1A");
        assert_eq!(books[0].cover, Some(55));
        assert_eq!(books[0].first_published, Some(1915));
    }

    #[tokio::test]
    async fn second_run_adds_nothing() {
        let file = dump(&[work("OL1W", "One"), work("OL2W", "Two"), work("OL3W", "Three")]);
        let store = InMemoryStore::new();
        let opts = options(&file, RecordKind::Work, 0);

        let first = ingest_file(&store, &opts, &NoProgress).await.unwrap();
        assert_eq!(first.imported, 3);

        let second = ingest_file(&store, &opts, &NoProgress).await.unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn start_line_skips_leading_lines() {
        let file = dump(&[work("OL1W", "One"), work("OL2W", "Two"), work("OL3W", "Three")]);
        let store = InMemoryStore::new();

        let resumed = ingest_file(&store, &options(&file, RecordKind::Work, 2), &NoProgress)
            .await
            .unwrap();
        assert_eq!(resumed.lines, 1);
        assert_eq!(resumed.imported, 1);
        assert_eq!(store.books()[0].key, "OL3W");

        // A full run afterwards fills in the rest without duplicating OL3W.
        let full = ingest_file(&store, &options(&file, RecordKind::Work, 0), &NoProgress)
            .await
            .unwrap();
        assert_eq!(full.imported, 2);
        assert_eq!(full.duplicates, 1);
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn start_line_past_end_reads_nothing() {
        let file = dump(&[work("OL1W", "One")]);
        let store = InMemoryStore::new();
        let summary = ingest_file(&store, &options(&file, RecordKind::Work, 10), &NoProgress)
            .await
            .unwrap();
        assert_eq!(summary.lines, 0);
        assert_eq!(summary.imported, 0);
    }

    #[tokio::test]
    async fn bad_lines_are_counted_not_fatal() {
        let mut raw = Vec::new();
        raw.extend_from_slice(work("OL1W", "One").as_bytes());
        raw.extend_from_slice(b"/type/work\t/works/OL2W\t1\t2010\t{\"key\": broken\n");
        raw.extend_from_slice(b"/type/work\t/works/OL3W\t1\t2010\t{\"key\":\"/works/OL3W\",\"title\":\"\xff\xfe\"}\n");
        raw.extend_from_slice(b"/type/work\t/works/OL4W\t{\"key\":\"/works/OL4W\"}\n");
        raw.extend_from_slice(b"\n");
        raw.extend_from_slice(b"/type/edition\t/books/OL1M\t1\t2010\t{}\n");
        raw.extend_from_slice(work("OL5W", "\u{6771}\u{4eac}").as_bytes());
        raw.extend_from_slice(work("OL6W", "Six").as_bytes());

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&raw).unwrap();
        file.flush().unwrap();

        let store = InMemoryStore::new();
        let summary = ingest_file(&store, &options(&file, RecordKind::Work, 0), &NoProgress)
            .await
            .unwrap();

        assert_eq!(summary.lines, 8);
        assert_eq!(summary.processed, 6);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.imported, 2);
        let keys: Vec<String> = store.books().into_iter().map(|b| b.key).collect();
        assert_eq!(keys, vec!["OL1W".to_string(), "OL6W".to_string()]);
    }

    #[tokio::test]
    async fn author_pass_ignores_works() {
        let file = dump(&[
            work("OL1W", "One"),
            author("OL1A", "Franz Kafka"),
            author("OL2A", "Jane Austen"),
            author("OL1A", "Franz Kafka"),
        ]);
        let store = InMemoryStore::new();
        let summary = ingest_file(&store, &options(&file, RecordKind::Author, 0), &NoProgress)
            .await
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 0);
        assert_eq!(store.count(RecordKind::Author).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let store = InMemoryStore::new();
        let opts = IngestOptions {
            path: PathBuf::from("/definitely/not/here.txt"),
            kind: RecordKind::Work,
            start_line: 0,
            batch_size: 10,
            progress_every: 10,
        };
        assert!(ingest_file(&store, &opts, &NoProgress).await.is_err());
    }

    /// Yields `data`, then fails every following read.
    struct BrokenReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl tokio::io::AsyncRead for BrokenReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            let this = self.get_mut();
            if this.pos < this.data.len() {
                let n = (this.data.len() - this.pos).min(buf.remaining());
                buf.put_slice(&this.data[this.pos..this.pos + n]);
                this.pos += n;
                std::task::Poll::Ready(Ok(()))
            } else {
                std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "device went away",
                )))
            }
        }
    }

    #[tokio::test]
    async fn read_failure_writes_pending_batch_first() {
        let data = [work("OL1W", "One"), work("OL2W", "Two")].concat().into_bytes();
        let reader = BufReader::new(BrokenReader { data, pos: 0 });
        let store = InMemoryStore::new();
        let opts = IngestOptions {
            path: PathBuf::from("dump.txt"),
            kind: RecordKind::Work,
            start_line: 0,
            batch_size: 10,
            progress_every: 100,
        };

        let err = ingest_reader(&store, reader, &opts, &NoProgress)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("device went away"));
        assert_eq!(store.count(RecordKind::Work).await.unwrap(), 2);
    }

    #[test]
    fn dump_path_falls_back_to_config() {
        let file = dump(&[work("OL1W", "One")]);
        let raw = format!(
            "[db]\npath = \"x.sqlite\"\n[import]\ndump_path = \"{}\"\n",
            file.path().display()
        );
        let config: Config = toml::from_str(&raw).unwrap();
        assert_eq!(resolve_dump_path(None, &config).unwrap(), file.path());

        let bare: Config = toml::from_str("[db]\npath = \"x.sqlite\"\n").unwrap();
        let err = resolve_dump_path(None, &bare).unwrap_err().to_string();
        assert!(err.contains("Usage"));
        assert!(resolve_dump_path(Some(PathBuf::from("/nope/dump.txt")), &bare).is_err());
    }
}
