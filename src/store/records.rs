//! Record upserts, media manifest updates, and the read-only query surface.

use crate::error::StoreError;
use crate::types::{MediaKind, RecordId};
use crate::{Error, Result};

use super::{MediaStats, NewRecord, Record, RecordFilter, SourceCursor, Store};

impl Store {
    /// Commit a batch of records together with the source cursor
    ///
    /// Records are upserted on their stable identifier: an existing row only
    /// has its late-arriving metric columns refreshed and keeps its media
    /// path. The cursor moves to the identifier of the batch's last record in
    /// pull order, inside the same transaction as the records. Returns the
    /// cursor after the commit.
    pub async fn commit_batch(
        &self,
        source: &str,
        records: &[NewRecord],
    ) -> Result<Option<SourceCursor>> {
        let Some(last) = records.last() else {
            return self.get_cursor(source).await;
        };

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to begin batch transaction: {}",
                e
            )))
        })?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO records (
                    record_id, date, sender_id, first_name, last_name, username,
                    body, media_kind, media_path, reply_to, post_author, views,
                    forwards, reactions
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?)
                ON CONFLICT(record_id) DO UPDATE SET
                    post_author = excluded.post_author,
                    views = excluded.views,
                    forwards = excluded.forwards,
                    reactions = excluded.reactions
                "#,
            )
            .bind(record.record_id)
            .bind(record.date)
            .bind(record.sender_id)
            .bind(&record.first_name)
            .bind(&record.last_name)
            .bind(&record.username)
            .bind(&record.body)
            .bind(record.media_kind)
            .bind(record.reply_to)
            .bind(&record.post_author)
            .bind(record.views)
            .bind(record.forwards)
            .bind(&record.reactions)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Store(StoreError::QueryFailed(format!(
                    "Failed to upsert record {}: {}",
                    record.record_id, e
                )))
            })?;
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO source_cursor (source, last_record_id, processed_count, last_run_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source) DO UPDATE SET
                last_record_id = excluded.last_record_id,
                processed_count = source_cursor.processed_count + ?,
                last_run_at = excluded.last_run_at
            "#,
        )
        .bind(source)
        .bind(last.record_id)
        .bind(records.len() as i64)
        .bind(now)
        .bind(records.len() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to advance cursor for {}: {}",
                source, e
            )))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to commit batch: {}",
                e
            )))
        })?;

        tracing::debug!(
            source,
            records = records.len(),
            last_record_id = %last.record_id,
            "batch committed"
        );

        self.get_cursor(source).await
    }

    /// Record the on-disk path of a downloaded attachment
    pub async fn update_media_path(&self, record_id: RecordId, path: &str) -> Result<()> {
        let result = sqlx::query("UPDATE records SET media_path = ? WHERE record_id = ?")
            .bind(path)
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Store(StoreError::QueryFailed(format!(
                    "Failed to update media path: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::Store(StoreError::NotFound(format!(
                "record {} has no row to attach media to",
                record_id
            ))));
        }

        Ok(())
    }

    /// Get a record by its stable identifier
    pub async fn get_record(&self, record_id: RecordId) -> Result<Option<Record>> {
        let row = sqlx::query_as::<_, Record>(
            r#"
            SELECT
                id, record_id, date, sender_id, first_name, last_name, username,
                body, media_kind, media_path, reply_to, post_author, views,
                forwards, reactions
            FROM records
            WHERE record_id = ?
            "#,
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to get record: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List records in identifier order, optionally filtered
    pub async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let mut builder = sqlx::QueryBuilder::new(
            "SELECT id, record_id, date, sender_id, first_name, last_name, username, \
             body, media_kind, media_path, reply_to, post_author, views, forwards, reactions \
             FROM records WHERE 1 = 1",
        );

        if let Some(since) = filter.since {
            builder.push(" AND date >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            builder.push(" AND date <= ").push_bind(until);
        }
        if let Some(with_media) = filter.with_media {
            builder.push(if with_media {
                " AND media_kind IS NOT NULL"
            } else {
                " AND media_kind IS NULL"
            });
        }
        builder.push(" ORDER BY record_id ASC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder
            .build_query_as::<Record>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Store(StoreError::QueryFailed(format!(
                    "Failed to list records: {}",
                    e
                )))
            })?;

        Ok(rows)
    }

    /// Total number of records in the store
    pub async fn record_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Store(StoreError::QueryFailed(format!(
                    "Failed to count records: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    /// Records carrying a media descriptor but no resolved path
    pub async fn missing_media(&self) -> Result<Vec<(RecordId, MediaKind)>> {
        let rows = sqlx::query_as::<_, (RecordId, MediaKind)>(
            r#"
            SELECT record_id, media_kind
            FROM records
            WHERE media_kind IS NOT NULL AND media_path IS NULL
            ORDER BY record_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to query missing media: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Which of the given records still lack a resolved media path
    ///
    /// Used by the ingestion engine to avoid re-downloading attachments that
    /// a previous run already resolved.
    pub async fn unresolved_media(&self, ids: &[RecordId]) -> Result<Vec<RecordId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = sqlx::QueryBuilder::new(
            "SELECT record_id FROM records \
             WHERE media_kind IS NOT NULL AND media_path IS NULL AND record_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        builder.push(")");

        let rows: Vec<RecordId> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Store(StoreError::QueryFailed(format!(
                    "Failed to query unresolved media: {}",
                    e
                )))
            })?;

        Ok(rows)
    }

    /// Attachment bookkeeping counts
    pub async fn media_stats(&self) -> Result<MediaStats> {
        let with_media: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE media_kind IS NOT NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Store(StoreError::QueryFailed(format!(
                        "Failed to count media records: {}",
                        e
                    )))
                })?;

        let resolved: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM records WHERE media_kind IS NOT NULL AND media_path IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to count resolved media: {}",
                e
            )))
        })?;

        Ok(MediaStats {
            with_media,
            resolved,
            missing: with_media - resolved,
        })
    }
}
