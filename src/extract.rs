//! Dump line extraction.
//!
//! A dump line is a tab-separated envelope whose first field is a type tag
//! (`/type/work`, `/type/author`, ...) and whose last field is a JSON object.
//! [`extract_line`] turns one line into a typed record or a [`SkipReason`].
//! Only a payload that is not valid JSON is an error; everything else that
//! cannot be imported is a skip.

use serde_json::Value;
use thiserror::Error;

use crate::models::{NewAuthor, NewBook, RecordKind};
use crate::sanitize::{sanitize_field, sanitize_latin_text};

/// Lines with fewer fields than this are not records.
pub const MIN_FIELDS: usize = 5;

/// Titles are cut to this many characters before sanitizing.
pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The type tag is neither work nor author.
    OtherType,
    TooFewFields,
    MissingKey,
    MissingTitle,
    MissingName,
}

/// A work as found in the dump, before text sanitizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRecord {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub subjects: Option<String>,
    pub author: String,
    pub cover: Option<i64>,
    pub first_published: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRecord {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Work(WorkRecord),
    Author(AuthorRecord),
    Skip(SkipReason),
}

/// Decode raw line bytes; invalid UTF-8 is a per-line error.
pub fn decode_line(bytes: &[u8]) -> Result<&str, ExtractError> {
    Ok(std::str::from_utf8(bytes)?)
}

/// Which record type a line carries, judged by its leading type tag.
pub fn record_kind(line: &str) -> Option<RecordKind> {
    [RecordKind::Work, RecordKind::Author]
        .into_iter()
        .find(|kind| line.starts_with(kind.type_tag()))
}

pub fn extract_line(line: &str) -> Result<Extracted, ExtractError> {
    let Some(kind) = record_kind(line) else {
        return Ok(Extracted::Skip(SkipReason::OtherType));
    };

    let fields: Vec<&str> = line.trim().split('\t').collect();
    if fields.len() < MIN_FIELDS {
        return Ok(Extracted::Skip(SkipReason::TooFewFields));
    }

    // The payload is always the last field; the envelope width varies.
    let payload: Value = serde_json::from_str(fields[fields.len() - 1])?;

    Ok(match kind {
        RecordKind::Work => extract_work(&payload),
        RecordKind::Author => extract_author(&payload),
    })
}

fn natural_key(payload: &Value, prefix: &str) -> Option<String> {
    let raw = payload.get("key")?.as_str()?;
    let key = raw.strip_prefix(prefix).unwrap_or(raw);
    (!key.is_empty()).then(|| key.to_string())
}

fn extract_work(payload: &Value) -> Extracted {
    let Some(key) = natural_key(payload, RecordKind::Work.key_prefix()) else {
        return Extracted::Skip(SkipReason::MissingKey);
    };

    let title = match payload.get("title").and_then(Value::as_str) {
        Some(t) if !t.is_empty() => t.chars().take(MAX_TITLE_CHARS).collect(),
        _ => return Extracted::Skip(SkipReason::MissingTitle),
    };

    Extracted::Work(WorkRecord {
        key,
        title,
        description: description(payload),
        subjects: subjects(payload),
        author: first_author_key(payload),
        cover: first_cover(payload),
        first_published: first_published(payload),
    })
}

fn extract_author(payload: &Value) -> Extracted {
    let Some(key) = natural_key(payload, RecordKind::Author.key_prefix()) else {
        return Extracted::Skip(SkipReason::MissingKey);
    };
    match payload.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Extracted::Author(AuthorRecord {
            key,
            name: name.to_string(),
        }),
        _ => Extracted::Skip(SkipReason::MissingName),
    }
}

/// `description` is either a plain string or `{"type": ..., "value": "..."}`.
fn description(payload: &Value) -> Option<String> {
    match payload.get("description")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("value")?.as_str().map(str::to_string),
        _ => None,
    }
}

fn subjects(payload: &Value) -> Option<String> {
    match payload.get("subjects")? {
        Value::Null => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Only the first listed author is kept; co-authors are dropped.
fn first_author_key(payload: &Value) -> String {
    payload
        .get("authors")
        .and_then(Value::as_array)
        .and_then(|authors| authors.first())
        .and_then(|entry| entry.get("author"))
        .and_then(|author| author.get("key"))
        .and_then(Value::as_str)
        .map(|key| {
            key.strip_prefix(RecordKind::Author.key_prefix())
                .unwrap_or(key)
                .to_string()
        })
        .unwrap_or_default()
}

fn first_cover(payload: &Value) -> Option<i64> {
    payload
        .get("covers")?
        .as_array()?
        .first()?
        .as_i64()
        .filter(|&id| id > 0)
}

/// Leading token of `first_publish_date`, when it is all ASCII digits. Other
/// decimal scripts such as full-width `１９１５` are not read as years.
fn first_published(payload: &Value) -> Option<i64> {
    let date = payload.get("first_publish_date")?.as_str()?;
    let token = date.split_whitespace().next()?;
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

impl WorkRecord {
    /// Run the Latin filter over the descriptive fields.
    ///
    /// Returns `None` when the title does not survive filtering.
    pub fn sanitize(self) -> Option<NewBook> {
        let title = sanitize_latin_text(&self.title)?;
        Some(NewBook {
            key: self.key,
            title,
            description: sanitize_field(self.description.as_deref()),
            subjects: sanitize_field(self.subjects.as_deref()),
            author: sanitize_latin_text(&self.author).unwrap_or_default(),
            cover: self.cover,
            first_published: self.first_published,
        })
    }
}

impl AuthorRecord {
    pub fn into_new_author(self) -> NewAuthor {
        NewAuthor {
            key: self.key,
            name: self.name,
        }
    }
}
