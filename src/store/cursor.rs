//! Source cursor rows: the durable resumption state.

use crate::error::StoreError;
use crate::types::RecordId;
use crate::{Error, Result};

use super::{SourceCursor, Store};

impl Store {
    /// Get the cursor for a source, if one was ever committed
    pub async fn get_cursor(&self, source: &str) -> Result<Option<SourceCursor>> {
        let row = sqlx::query_as::<_, SourceCursor>(
            r#"
            SELECT source, last_record_id, processed_count, last_run_at
            FROM source_cursor
            WHERE source = ?
            "#,
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to get cursor: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Overwrite the cursor row for a source
    ///
    /// [`Store::commit_batch`] is the normal path; this exists for callers
    /// that manage the cursor explicitly (and for tests).
    pub async fn update_cursor(&self, cursor: &SourceCursor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_cursor (source, last_record_id, processed_count, last_run_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source) DO UPDATE SET
                last_record_id = excluded.last_record_id,
                processed_count = excluded.processed_count,
                last_run_at = excluded.last_run_at
            "#,
        )
        .bind(&cursor.source)
        .bind(cursor.last_record_id)
        .bind(cursor.processed_count)
        .bind(cursor.last_run_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to update cursor: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Delete the cursor row, forcing the next run to start from zero
    pub async fn reset_cursor(&self, source: &str) -> Result<()> {
        sqlx::query("DELETE FROM source_cursor WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Store(StoreError::QueryFailed(format!(
                    "Failed to reset cursor: {}",
                    e
                )))
            })?;

        tracing::info!(source, "cursor reset");
        Ok(())
    }

    /// Largest record identifier held by the store, if any
    pub async fn max_record_id(&self) -> Result<Option<RecordId>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(record_id) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Store(StoreError::QueryFailed(format!(
                    "Failed to query max record id: {}",
                    e
                )))
            })?;

        Ok(max.map(RecordId))
    }
}
