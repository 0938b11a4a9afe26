//! Progress tracking: resumption offsets over the store's cursor rows
//!
//! No state of its own — the cursor rows committed alongside record batches
//! are the single source of truth. The one invariant enforced here is that a
//! reported offset is never ahead of committed data: a cursor pointing past
//! the records table means the store lost data out from under the cursor, and
//! ingestion for that source must halt until an explicit reset.

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::RecordId;
use std::sync::Arc;

/// Thin accessor over a source's cursor rows
pub struct ProgressTracker {
    store: Arc<Store>,
}

impl ProgressTracker {
    /// Create a tracker over the given store
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Offset the next ingestion run should resume from
    ///
    /// Returns zero when no cursor exists (first run), otherwise the last
    /// committed record identifier. Fails with [`Error::Corruption`] when the
    /// cursor is ahead of the data actually persisted.
    pub async fn resume_offset(&self, source: &str) -> Result<RecordId> {
        let Some(cursor) = self.store.get_cursor(source).await? else {
            return Ok(RecordId(0));
        };

        let max = self.store.max_record_id().await?;
        match max {
            Some(max) if cursor.last_record_id <= max => Ok(cursor.last_record_id),
            _ => Err(Error::Corruption {
                source_id: source.to_string(),
                detail: format!(
                    "cursor at {} but records table holds {}",
                    cursor.last_record_id,
                    max.map_or_else(|| "no rows".to_string(), |m| format!("up to {m}")),
                ),
            }),
        }
    }

    /// Drop the cursor so the next run re-ingests from zero
    pub async fn reset(&self, source: &str) -> Result<()> {
        self.store.reset_cursor(source).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewRecord, SourceCursor};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn record(id: i64) -> NewRecord {
        NewRecord {
            record_id: RecordId(id),
            date: 1_700_000_000,
            sender_id: None,
            first_name: None,
            last_name: None,
            username: None,
            body: String::new(),
            media_kind: None,
            reply_to: None,
            post_author: None,
            views: None,
            forwards: None,
            reactions: None,
        }
    }

    #[tokio::test]
    async fn first_run_resumes_from_zero() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::open(temp_file.path()).await.unwrap());
        let tracker = ProgressTracker::new(store);

        assert_eq!(tracker.resume_offset("src").await.unwrap(), RecordId(0));
    }

    #[tokio::test]
    async fn resumes_from_the_committed_cursor() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::open(temp_file.path()).await.unwrap());
        store
            .commit_batch("src", &[record(1), record(2)])
            .await
            .unwrap();

        let tracker = ProgressTracker::new(Arc::clone(&store));
        assert_eq!(tracker.resume_offset("src").await.unwrap(), RecordId(2));
    }

    #[tokio::test]
    async fn cursor_ahead_of_data_is_corruption() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::open(temp_file.path()).await.unwrap());
        store.commit_batch("src", &[record(5)]).await.unwrap();
        store
            .update_cursor(&SourceCursor {
                source: "src".to_string(),
                last_record_id: RecordId(999),
                processed_count: 999,
                last_run_at: 1_700_000_000,
            })
            .await
            .unwrap();

        let tracker = ProgressTracker::new(Arc::clone(&store));
        assert!(matches!(
            tracker.resume_offset("src").await,
            Err(Error::Corruption { .. })
        ));

        // Explicit reset recovers the source
        tracker.reset("src").await.unwrap();
        assert_eq!(tracker.resume_offset("src").await.unwrap(), RecordId(0));
    }

    #[tokio::test]
    async fn cursor_with_no_records_at_all_is_corruption() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::open(temp_file.path()).await.unwrap());
        store
            .update_cursor(&SourceCursor {
                source: "src".to_string(),
                last_record_id: RecordId(10),
                processed_count: 10,
                last_run_at: 1_700_000_000,
            })
            .await
            .unwrap();

        let tracker = ProgressTracker::new(store);
        assert!(matches!(
            tracker.resume_offset("src").await,
            Err(Error::Corruption { .. })
        ));
    }
}
