//! Raw message normalization.

use crate::source::{RawMessage, Reaction};
use crate::store::NewRecord;
use crate::types::RecordId;

/// Turn a raw upstream message into the record shape the store persists
pub(crate) fn normalize(raw: &RawMessage) -> NewRecord {
    let (sender_id, first_name, last_name, username) = match &raw.sender {
        Some(sender) => (
            Some(sender.id),
            sender.first_name.clone(),
            sender.last_name.clone(),
            sender.username.clone(),
        ),
        None => (None, None, None, None),
    };

    NewRecord {
        record_id: RecordId(raw.id),
        date: raw.date,
        sender_id,
        first_name,
        last_name,
        username,
        body: raw.body.clone(),
        media_kind: raw.media.as_ref().map(|m| m.kind),
        reply_to: raw.reply_to.map(RecordId),
        post_author: raw.post_author.clone(),
        views: raw.views,
        forwards: raw.forwards,
        reactions: format_reactions(&raw.reactions),
    }
}

/// Fold reaction aggregates into a single "emoji count" summary column
///
/// Reactions without an emoji are skipped; no usable reactions yields NULL.
pub(crate) fn format_reactions(reactions: &[Reaction]) -> Option<String> {
    let parts: Vec<String> = reactions
        .iter()
        .filter(|r| !r.emoji.is_empty())
        .map(|r| format!("{} {}", r.emoji, r.count))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}
