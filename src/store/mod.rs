//! SQLite persistence layer
//!
//! One store per source: a records table, a cursor table, and a
//! `schema_version` table driving the migration list. Methods on [`Store`]
//! are organized by domain:
//! - [`migrations`] — store lifecycle, schema migrations
//! - [`records`] — batched upserts, media manifest updates, read queries
//! - [`cursor`] — resumption cursor rows
//!
//! The batch-and-cursor commit in [`Store::commit_batch`] is the resumption
//! invariant: records and their cursor land in one transaction, so a crash
//! can lose an unflushed in-memory batch but never leave the cursor ahead of
//! persisted data. SQLite's single-writer discipline (WAL mode) serializes
//! writes per source database; independent sources use independent files.

use crate::types::{MediaKind, RecordId};
use sqlx::{FromRow, sqlite::SqlitePool};

mod cursor;
mod migrations;
mod records;

/// New record to be upserted into the store
///
/// The media path is intentionally absent: records are always inserted with
/// an unresolved path, and the path is set only by the download pool once the
/// bytes are on disk.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Stable identifier from the upstream source
    pub record_id: RecordId,
    /// Unix timestamp of the record
    pub date: i64,
    /// Originator identifier, when known
    pub sender_id: Option<i64>,
    /// Originator given name
    pub first_name: Option<String>,
    /// Originator family name
    pub last_name: Option<String>,
    /// Originator handle
    pub username: Option<String>,
    /// Textual body
    pub body: String,
    /// Kind of attached media, if any
    pub media_kind: Option<MediaKind>,
    /// Identifier of the record this one replies to
    pub reply_to: Option<RecordId>,
    /// Author attribution on broadcast posts
    pub post_author: Option<String>,
    /// View count (late-arriving metric, refreshed on re-ingestion)
    pub views: Option<i64>,
    /// Forward count (late-arriving metric, refreshed on re-ingestion)
    pub forwards: Option<i64>,
    /// Formatted reaction summary (late-arriving metric)
    pub reactions: Option<String>,
}

/// Record row from the store
#[derive(Debug, Clone, FromRow)]
pub struct Record {
    /// Row id
    pub id: i64,
    /// Stable identifier from the upstream source
    pub record_id: RecordId,
    /// Unix timestamp of the record
    pub date: i64,
    /// Originator identifier, when known
    pub sender_id: Option<i64>,
    /// Originator given name
    pub first_name: Option<String>,
    /// Originator family name
    pub last_name: Option<String>,
    /// Originator handle
    pub username: Option<String>,
    /// Textual body
    pub body: String,
    /// Kind of attached media, if any
    pub media_kind: Option<MediaKind>,
    /// Path of the downloaded attachment relative to the source directory,
    /// NULL until a download job resolves it
    pub media_path: Option<String>,
    /// Identifier of the record this one replies to
    pub reply_to: Option<RecordId>,
    /// Author attribution on broadcast posts
    pub post_author: Option<String>,
    /// View count
    pub views: Option<i64>,
    /// Forward count
    pub forwards: Option<i64>,
    /// Formatted reaction summary
    pub reactions: Option<String>,
}

/// Per-source resumption pointer
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SourceCursor {
    /// Source identifier
    pub source: String,
    /// Identifier of the last record committed in pull order
    pub last_record_id: RecordId,
    /// Cumulative records committed across all runs
    pub processed_count: i64,
    /// Unix timestamp of the last batch commit
    pub last_run_at: i64,
}

/// Filter for the read-only record listing
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Only records with `date >= since`
    pub since: Option<i64>,
    /// Only records with `date <= until`
    pub until: Option<i64>,
    /// `Some(true)` restricts to records carrying media, `Some(false)` to
    /// records without
    pub with_media: Option<bool>,
    /// Cap on the number of rows returned
    pub limit: Option<i64>,
}

/// Attachment bookkeeping counts for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaStats {
    /// Records carrying a media descriptor
    pub with_media: i64,
    /// Records whose attachment is on disk
    pub resolved: i64,
    /// Records still waiting for (or having permanently failed) a download
    pub missing: i64,
}

/// Store handle for one source
pub struct Store {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
