mod migrations;

use super::NewRecord;
use crate::types::{MediaKind, RecordId};

/// Minimal record for store tests.
pub(crate) fn new_record(id: i64) -> NewRecord {
    NewRecord {
        record_id: RecordId(id),
        date: 1_700_000_000 + id,
        sender_id: Some(42),
        first_name: Some("Ada".to_string()),
        last_name: None,
        username: Some("ada".to_string()),
        body: format!("body {id}"),
        media_kind: None,
        reply_to: None,
        post_author: None,
        views: None,
        forwards: None,
        reactions: None,
    }
}

/// Record carrying a media descriptor (path unresolved).
pub(crate) fn new_record_with_media(id: i64, kind: MediaKind) -> NewRecord {
    NewRecord {
        media_kind: Some(kind),
        ..new_record(id)
    }
}
