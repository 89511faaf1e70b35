//! # Book club catalog
//!
//! Batch tooling that fills and maintains the book catalog read by the book
//! club application.
//!
//! The catalog comes from a very large tab-separated dump in which each line
//! carries a type tag and a JSON payload. Import streams the dump once per
//! record type, filters text to Latin script, skips keys that are already
//! stored and writes in batches. Cleanup walks the stored books page by page
//! and reports or deletes rows that fail a quality criterion.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │ dump file │──▶│ extract  │──▶│ sanitize │──▶│ BatchWriter │──▶│  SQLite  │
//! └───────────┘   └──────────┘   └──────────┘   └─────────────┘   └────┬─────┘
//!                                                                     │
//!                               ┌──────────┐   ┌──────────┐           │
//!                               │ optimize │◀──│ cleanup  │◀──────────┘
//!                               └──────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Record and row types |
//! | [`extract`] | Dump line → typed record |
//! | [`sanitize`] | Latin-script text filter |
//! | [`writer`] | Deduplicating batch writer |
//! | [`ingest`] | Import driver |
//! | [`cleanup`] | Deletion criteria and the cleanup engine |
//! | [`optimize`] | Post-cleanup store maintenance |
//! | [`recommend`] | Recommended books refresh |
//! | [`stats`] | Catalog statistics |
//! | [`store`] | Storage trait, SQLite and in-memory stores |
//! | [`progress`] | Progress reporting |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation and version check |

pub mod cleanup;
pub mod config;
pub mod db;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod optimize;
pub mod progress;
pub mod recommend;
pub mod sanitize;
pub mod stats;
pub mod store;
pub mod writer;
