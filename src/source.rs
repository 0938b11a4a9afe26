//! Remote source abstraction
//!
//! The crate implements no wire protocol. Embedders provide a [`SourceClient`]
//! for whatever upstream service they archive; the engine only assumes
//! offset-based pagination and a byte stream per media reference, with
//! throttling surfaced as [`FetchError::Throttled`].

use crate::error::FetchError;
use crate::types::{Direction, MediaKind, MediaRef, RecordId};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Byte stream for one media object
pub type MediaByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Originator identity attached to a raw message
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawSender {
    /// Upstream identifier of the sender
    pub id: i64,
    /// Given name, if the source exposes one
    pub first_name: Option<String>,
    /// Family name, if the source exposes one
    pub last_name: Option<String>,
    /// Handle, if the source exposes one
    pub username: Option<String>,
}

/// One reaction aggregate on a raw message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reaction {
    /// The reaction emoji
    pub emoji: String,
    /// How many times it was applied
    pub count: i64,
}

/// Media descriptor on a raw message, before any bytes are retrieved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMedia {
    /// Kind of media
    pub kind: MediaKind,
    /// Original file name, when the source provides one
    pub file_name: Option<String>,
}

/// A message as produced by the remote source, prior to normalization
#[derive(Clone, Debug, Default)]
pub struct RawMessage {
    /// Stable identifier, unique within the source
    pub id: i64,
    /// Unix timestamp of the message
    pub date: i64,
    /// Originator, when known
    pub sender: Option<RawSender>,
    /// Textual body (may be empty for pure-media messages)
    pub body: String,
    /// Attached media, if any
    pub media: Option<RawMedia>,
    /// Identifier of the message this one replies to
    pub reply_to: Option<i64>,
    /// Author attribution on broadcast posts
    pub post_author: Option<String>,
    /// View count, when the source reports one (may arrive late or never)
    pub views: Option<i64>,
    /// Forward count, when the source reports one
    pub forwards: Option<i64>,
    /// Reaction aggregates, empty when none
    pub reactions: Vec<Reaction>,
}

/// Client for the remote paginated source
///
/// Pagination is not resumable mid-sequence: each call re-opens the stream at
/// an explicit offset. With [`Direction::OldestFirst`] a page contains
/// identifiers strictly greater than `after`, in ascending order; with
/// [`Direction::NewestFirst`] strictly less, in descending order (`after = 0`
/// meaning "from the newest"). An empty page signals exhaustion.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch the next page of messages relative to `after`
    async fn next_page(
        &self,
        source: &str,
        after: RecordId,
        direction: Direction,
    ) -> Result<Vec<RawMessage>, FetchError>;

    /// Open the byte stream for a media reference
    async fn open_media(&self, media: &MediaRef) -> Result<MediaByteStream, FetchError>;
}
