//! Core data models used throughout the catalog tooling.
//!
//! These types represent the records that flow from the dump through the
//! ingestion pipeline into the store, and the rows the cleanup engine reads back.

/// Which kind of dump line an import pass consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Work,
    Author,
}

impl RecordKind {
    /// Prefix of the first tab-separated field that marks this record type.
    pub fn type_tag(self) -> &'static str {
        match self {
            RecordKind::Work => "/type/work",
            RecordKind::Author => "/type/author",
        }
    }

    /// Namespace prefix stripped from the payload `key`.
    pub fn key_prefix(self) -> &'static str {
        match self {
            RecordKind::Work => "/works/",
            RecordKind::Author => "/authors/",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            RecordKind::Work => "books",
            RecordKind::Author => "authors",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Work => "works",
            RecordKind::Author => "authors",
        }
    }
}

/// A work ready to be inserted into `books`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub subjects: Option<String>,
    pub author: String,
    pub cover: Option<i64>,
    pub first_published: Option<i64>,
}

/// An author ready to be inserted into `authors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthor {
    pub key: String,
    pub name: String,
}

/// A pending insert of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewRecord {
    Book(NewBook),
    Author(NewAuthor),
}

impl NewRecord {
    pub fn key(&self) -> &str {
        match self {
            NewRecord::Book(b) => &b.key,
            NewRecord::Author(a) => &a.key,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            NewRecord::Book(_) => RecordKind::Work,
            NewRecord::Author(_) => RecordKind::Author,
        }
    }
}

/// The columns of a stored `books` row that cleanup criteria look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub subjects: Option<String>,
}
