//! Core types for msgvault

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::store::SourceCursor;

/// Stable identifier of an ingested record, as assigned by the upstream source
///
/// Unique within a source and monotonically increasing in upstream production
/// order. Uniqueness is enforced by the store through upserts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Create a new RecordId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for RecordId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<RecordId> for i64 {
    fn eq(&self, other: &RecordId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for RecordId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RecordId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RecordId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Kind of media attached to a record, stored as TEXT
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image
    Photo,
    /// Generic file attachment
    Document,
    /// Video clip
    Video,
    /// Audio clip or voice note
    Audio,
}

impl MediaKind {
    /// Canonical lowercase name, used as the stored column value
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Parse a stored column value back into a kind
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaKind::Photo),
            "document" => Some(MediaKind::Document),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Fallback file name for sources that do not provide one
    pub fn default_file_name(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo.jpg",
            MediaKind::Document => "document.bin",
            MediaKind::Video => "video.mp4",
            MediaKind::Audio => "audio.ogg",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for MediaKind {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for MediaKind {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode(self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for MediaKind {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        MediaKind::parse(text).ok_or_else(|| format!("unknown media kind: {text}").into())
    }
}

/// Pagination direction through a source
///
/// Offset semantics depend on the direction and are fixed for the lifetime of
/// a source's store: with [`Direction::OldestFirst`] a pull resumes strictly
/// after the cursor in ascending identifier order; with
/// [`Direction::NewestFirst`] strictly before it in descending order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Ascending identifier order (resumes after the cursor)
    #[default]
    OldestFirst,
    /// Descending identifier order (resumes before the cursor)
    NewestFirst,
}

/// Reference to a remote media object attached to a record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    /// Record that owns the attachment
    pub record_id: RecordId,
    /// Kind of media
    pub kind: MediaKind,
    /// Original file name, when the source provides one
    pub file_name: Option<String>,
}

/// A scheduled attachment download
///
/// Created by the ingestion engine for every committed record whose media
/// path is still unresolved. The pending → in-flight → done/failed lifecycle
/// is tracked by the download coordinator; the durable outcome is the
/// record's media path column.
#[derive(Clone, Debug)]
pub struct DownloadJob {
    /// The media to retrieve
    pub media: MediaRef,
    /// Absolute path the bytes are written to
    pub target: PathBuf,
    /// Path recorded in the store on success, relative to the source directory
    pub manifest_path: String,
}

/// Aggregate result of draining the download coordinator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Jobs whose bytes were written and manifest updated
    pub succeeded: u64,
    /// Jobs that reached the failed state after exhausting retries
    pub failed: u64,
}

/// Outcome of a full ingestion run over one source
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// The source that was ingested
    pub source: String,
    /// Records committed during this run
    pub processed: u64,
    /// Attachment download counts
    pub downloads: DrainOutcome,
    /// Cursor position after the run, if any batch was ever committed
    pub cursor: Option<SourceCursor>,
}

/// Event emitted while a run progresses
///
/// Consumers subscribe through [`crate::IngestEngine::subscribe`]; the engine
/// never blocks on slow subscribers.
#[derive(Clone, Debug)]
pub enum Event {
    /// A batch of records and its cursor were committed in one transaction
    BatchCommitted {
        /// Source the batch belongs to
        source: String,
        /// Number of records in the batch
        records: u64,
        /// Identifier of the last record in the batch, now the cursor position
        last_record_id: RecordId,
    },

    /// The source throttled a page pull; the engine is backing off
    SourceThrottled {
        /// Source being pulled
        source: String,
        /// Wait duration before the pull resumes
        retry_after: Duration,
    },

    /// An attachment was fully written and its manifest updated
    AttachmentStored {
        /// Record that owns the attachment
        record_id: RecordId,
        /// Bytes written to the target file
        bytes: u64,
        /// Final path of the attachment
        path: PathBuf,
    },

    /// An attachment job reached the failed state
    AttachmentFailed {
        /// Record that owns the attachment
        record_id: RecordId,
        /// Description of the terminal failure
        error: String,
    },
}
