//! Ingestion engine: drives pagination against the remote source, batches
//! durable writes, and feeds the download pool
//!
//! One sequential ingestion flow per source — pagination is inherently
//! ordered, so pulls are never parallelized — composed with the
//! bounded-concurrency download pool that runs alongside it. Every flush
//! commits the batch and the source cursor in one store transaction, which
//! makes interruption safe: a crash loses at most the unflushed in-memory
//! batch, and the next run resumes from the committed cursor with upserts
//! absorbing any overlap.

mod normalize;

use crate::config::Config;
use crate::downloads::{AttachmentFetcher, DownloadCoordinator, target_file_name};
use crate::error::{FetchError, Result};
use crate::progress::ProgressTracker;
use crate::retry;
use crate::source::{RawMessage, SourceClient};
use crate::store::{NewRecord, Store};
use crate::types::{Direction, DownloadJob, DrainOutcome, Event, MediaRef, RecordId, RunSummary};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel; slow subscribers lose old events
/// rather than backpressuring the engine
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Drives ingestion for sources backed by one store
pub struct IngestEngine {
    client: Arc<dyn SourceClient>,
    store: Arc<Store>,
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl IngestEngine {
    /// Create an engine over a source client and an open store
    pub fn new(client: Arc<dyn SourceClient>, store: Arc<Store>, config: Config) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            store,
            config: Arc::new(config),
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that cancels this engine's pulls and download admissions
    ///
    /// Cancellation stops the in-flight pull promptly and leaves the cursor
    /// at its last committed value; the unflushed partial batch is discarded
    /// and re-pulled by the next run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The store backing this engine (read-only surface for export layers)
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Full archiving pass: ingest every new record, then wait for all
    /// attachment downloads to reach a terminal state
    pub async fn run(&self, source: &str) -> Result<RunSummary> {
        let coordinator = self.new_coordinator();
        let processed = self.ingest(source, None, &coordinator).await?;
        let downloads = coordinator.drain().await;
        let cursor = self.store.get_cursor(source).await?;

        tracing::info!(
            source,
            processed,
            downloads_succeeded = downloads.succeeded,
            downloads_failed = downloads.failed,
            cursor = cursor.as_ref().map(|c| c.last_record_id.get()),
            "run complete"
        );

        Ok(RunSummary {
            source: source.to_string(),
            processed,
            downloads,
            cursor,
        })
    }

    /// Build a download pool wired to this engine's store, retry policy,
    /// cancellation scope, and event stream
    pub fn new_coordinator(&self) -> DownloadCoordinator {
        let fetcher =
            AttachmentFetcher::new(Arc::clone(&self.client), self.config.downloads.fetch_timeout);
        DownloadCoordinator::new(
            fetcher,
            Arc::clone(&self.store),
            &self.config,
            self.cancel.child_token(),
            self.event_tx.clone(),
        )
    }

    /// Pull records from `start` (or the tracked cursor) until the source is
    /// exhausted, committing batches as they fill
    ///
    /// Returns the number of records committed. Download jobs for committed
    /// records with unresolved media are handed to `downloads` without
    /// waiting on them.
    pub async fn ingest(
        &self,
        source: &str,
        start: Option<RecordId>,
        downloads: &DownloadCoordinator,
    ) -> Result<u64> {
        let tracker = ProgressTracker::new(Arc::clone(&self.store));
        let mut after = match start {
            Some(id) => id,
            None => tracker.resume_offset(source).await?,
        };
        let direction = self.config.ingest.direction;
        let batch_size = self.config.ingest.batch_size.max(1);
        let media_dir = self.config.media_dir(source);

        let mut committed: u64 = 0;
        let mut batch: Vec<NewRecord> = Vec::with_capacity(batch_size);
        let mut media_refs: Vec<MediaRef> = Vec::new();

        tracing::info!(source, offset = %after, ?direction, "ingestion started");

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(source, committed, "ingestion cancelled, discarding unflushed batch");
                return Ok(committed);
            }

            let page = self.pull_page(source, after, direction).await?;
            if self.cancel.is_cancelled() {
                tracing::info!(source, committed, "ingestion cancelled, discarding unflushed batch");
                return Ok(committed);
            }
            if page.is_empty() {
                break;
            }

            for raw in &page {
                let record = normalize::normalize(raw);
                after = record.record_id;

                if self.config.downloads.enabled {
                    if let Some(media) = &raw.media {
                        media_refs.push(MediaRef {
                            record_id: record.record_id,
                            kind: media.kind,
                            file_name: media.file_name.clone(),
                        });
                    }
                }

                batch.push(record);
                if batch.len() >= batch_size {
                    committed += self
                        .flush(source, &mut batch, &mut media_refs, &media_dir, downloads)
                        .await?;
                }
            }
        }

        if !batch.is_empty() {
            committed += self
                .flush(source, &mut batch, &mut media_refs, &media_dir, downloads)
                .await?;
        }

        tracing::info!(source, committed, "ingestion finished");
        Ok(committed)
    }

    /// Re-enqueue download jobs for every record whose media kind is set but
    /// whose path never resolved, and drain them
    ///
    /// Permanently failed jobs are terminal within a run; this explicit pass
    /// is the only way they are attempted again.
    pub async fn rescan_missing_media(&self, source: &str) -> Result<DrainOutcome> {
        let missing = self.store.missing_media().await?;
        if missing.is_empty() {
            return Ok(DrainOutcome::default());
        }

        let coordinator = self.new_coordinator();
        let media_dir = self.config.media_dir(source);
        let mut enqueued: u64 = 0;
        for (record_id, kind) in missing {
            let media = MediaRef {
                record_id,
                kind,
                file_name: None,
            };
            coordinator.submit(build_job(media, &media_dir))?;
            enqueued += 1;
        }

        tracing::info!(source, enqueued, "re-scanning unresolved attachments");
        Ok(coordinator.drain().await)
    }

    /// Commit the batch + cursor, emit the event, and enqueue download jobs
    /// for batch members whose media path is still unresolved
    async fn flush(
        &self,
        source: &str,
        batch: &mut Vec<NewRecord>,
        media_refs: &mut Vec<MediaRef>,
        media_dir: &Path,
        downloads: &DownloadCoordinator,
    ) -> Result<u64> {
        let flushed = batch.len() as u64;
        let cursor = self.store.commit_batch(source, batch).await?;
        batch.clear();

        if let Some(cursor) = &cursor {
            self.event_tx
                .send(Event::BatchCommitted {
                    source: source.to_string(),
                    records: flushed,
                    last_record_id: cursor.last_record_id,
                })
                .ok();
        }

        if !media_refs.is_empty() {
            let ids: Vec<RecordId> = media_refs.iter().map(|m| m.record_id).collect();
            let unresolved: HashSet<RecordId> =
                self.store.unresolved_media(&ids).await?.into_iter().collect();

            for media in media_refs.drain(..) {
                if !unresolved.contains(&media.record_id) {
                    continue;
                }
                if let Err(e) = downloads.submit(build_job(media, media_dir)) {
                    tracing::warn!(source, error = %e, "download pool rejected job");
                    break;
                }
            }
        }

        Ok(flushed)
    }

    /// Pull one page through the retry policy, bounded by the pull timeout
    /// and aborted promptly on cancellation (returning an empty page)
    async fn pull_page(
        &self,
        source: &str,
        after: RecordId,
        direction: Direction,
    ) -> Result<Vec<RawMessage>> {
        let pull_timeout = self.config.ingest.pull_timeout;
        let client = Arc::clone(&self.client);
        let event_tx = &self.event_tx;

        let pull = retry::fetch_with_policy(
            &self.config.retry,
            || {
                let client = Arc::clone(&client);
                let source = source.to_string();
                async move {
                    match tokio::time::timeout(
                        pull_timeout,
                        client.next_page(&source, after, direction),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Transient(format!(
                            "page pull timed out after {pull_timeout:?}"
                        ))),
                    }
                }
            },
            |wait| {
                event_tx
                    .send(Event::SourceThrottled {
                        source: source.to_string(),
                        retry_after: wait,
                    })
                    .ok();
            },
        );

        tokio::select! {
            _ = self.cancel.cancelled() => Ok(Vec::new()),
            page = pull => Ok(page?),
        }
    }
}

/// Build the job that materializes one media reference on disk
fn build_job(media: MediaRef, media_dir: &Path) -> DownloadJob {
    let file_name = target_file_name(&media);
    DownloadJob {
        target: media_dir.join(&file_name),
        manifest_path: format!("media/{file_name}"),
        media,
    }
}
