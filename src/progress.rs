//! Import and cleanup progress reporting.
//!
//! Long batch runs report throughput and running counters at a fixed cadence so
//! operators can see how far a multi-gigabyte dump or a multi-million row table
//! has got. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Import pass: counters after `lines` dump lines.
    Importing {
        kind: String,
        lines: u64,
        processed: u64,
        imported: u64,
        errors: u64,
        lines_per_sec: f64,
    },
    /// Cleanup pass: `scanned` of `total` rows checked against one criterion.
    Cleaning {
        criterion: String,
        scanned: u64,
        total: u64,
        matched: u64,
        rows_per_sec: f64,
    },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "import works  1,200,000 lines  ...".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Importing {
                kind,
                lines,
                processed,
                imported,
                errors,
                lines_per_sec,
            } => format!(
                "import {}  {} lines  {} processed  {} imported  {} errors  ({:.1} lines/sec)\n",
                kind,
                format_number(*lines),
                format_number(*processed),
                format_number(*imported),
                format_number(*errors),
                lines_per_sec
            ),
            ProgressEvent::Cleaning {
                criterion,
                scanned,
                total,
                matched,
                rows_per_sec,
            } => format!(
                "clean {}  {} / {} rows  {} matched  ({:.1} rows/sec)\n",
                criterion,
                format_number(*scanned),
                format_number(*total),
                format_number(*matched),
                rows_per_sec
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Importing {
                kind,
                lines,
                processed,
                imported,
                errors,
                lines_per_sec,
            } => serde_json::json!({
                "event": "progress",
                "phase": "import",
                "kind": kind,
                "lines": lines,
                "processed": processed,
                "imported": imported,
                "errors": errors,
                "lines_per_sec": lines_per_sec
            }),
            ProgressEvent::Cleaning {
                criterion,
                scanned,
                total,
                matched,
                rows_per_sec,
            } => serde_json::json!({
                "event": "progress",
                "phase": "clean",
                "criterion": criterion,
                "scanned": scanned,
                "total": total,
                "matched": matched,
                "rows_per_sec": rows_per_sec
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Format a count with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Units per second, zero when no time has passed.
pub fn rate(count: u64, elapsed: std::time::Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "invalid progress mode '{}': expected human, json, or off",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn rate_guards_zero_elapsed() {
        assert_eq!(rate(100, Duration::ZERO), 0.0);
        assert!((rate(100, Duration::from_secs(4)) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn parses_modes() {
        assert_eq!("JSON".parse::<ProgressMode>().unwrap(), ProgressMode::Json);
        assert_eq!("off".parse::<ProgressMode>().unwrap(), ProgressMode::Off);
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
