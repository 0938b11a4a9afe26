//! Shared test helpers: a scripted source client and engine construction.

use crate::config::{Config, RetryConfig};
use crate::error::FetchError;
use crate::ingest::IngestEngine;
use crate::source::{MediaByteStream, RawMedia, RawMessage, RawSender, SourceClient};
use crate::store::Store;
use crate::types::{Direction, MediaKind, MediaRef, RecordId};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Default payload served for media that was never scripted explicitly.
pub(crate) const DEFAULT_MEDIA_BYTES: &[u8] = b"media-bytes";

/// Scripted outcome for one `open_media` call.
pub(crate) enum MediaOutcome {
    /// Serve these bytes as a single chunk.
    Bytes(Vec<u8>),
    /// Fail the open call.
    Fail(FetchError),
}

/// In-memory source client driven by scripted pages and media outcomes.
///
/// Pages are served in order; once the script is exhausted every further pull
/// returns an empty page. Media outcomes are scripted per record id and
/// popped per attempt, falling back to `DEFAULT_MEDIA_BYTES`.
pub(crate) struct ScriptedSource {
    pages: Mutex<VecDeque<Result<Vec<RawMessage>, FetchError>>>,
    media: Mutex<HashMap<i64, VecDeque<MediaOutcome>>>,
    pull_offsets: Mutex<Vec<i64>>,
    media_attempts: Mutex<HashMap<i64, Vec<Instant>>>,
    media_in_flight: AtomicUsize,
    media_in_flight_max: AtomicUsize,
    media_delay: Duration,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            media: Mutex::new(HashMap::new()),
            pull_offsets: Mutex::new(Vec::new()),
            media_attempts: Mutex::new(HashMap::new()),
            media_in_flight: AtomicUsize::new(0),
            media_in_flight_max: AtomicUsize::new(0),
            media_delay: Duration::from_millis(0),
        }
    }

    /// Hold each media transfer open for `delay` so concurrency is observable.
    pub(crate) fn with_media_delay(mut self, delay: Duration) -> Self {
        self.media_delay = delay;
        self
    }

    pub(crate) fn push_page(&self, messages: Vec<RawMessage>) {
        self.pages.lock().unwrap().push_back(Ok(messages));
    }

    pub(crate) fn push_page_error(&self, error: FetchError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn script_media(&self, record_id: i64, outcomes: Vec<MediaOutcome>) {
        self.media
            .lock()
            .unwrap()
            .insert(record_id, outcomes.into());
    }

    /// Offsets `next_page` was called with, in order.
    pub(crate) fn pull_offsets(&self) -> Vec<i64> {
        self.pull_offsets.lock().unwrap().clone()
    }

    /// Timestamps of each `open_media` call for one record.
    pub(crate) fn media_attempts(&self, record_id: i64) -> Vec<Instant> {
        self.media_attempts
            .lock()
            .unwrap()
            .get(&record_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn media_attempt_count(&self, record_id: i64) -> usize {
        self.media_attempts(record_id).len()
    }

    /// Highest number of media transfers that were ever open at once.
    pub(crate) fn max_media_in_flight(&self) -> usize {
        self.media_in_flight_max.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn next_page(
        &self,
        _source: &str,
        after: RecordId,
        _direction: Direction,
    ) -> Result<Vec<RawMessage>, FetchError> {
        self.pull_offsets.lock().unwrap().push(after.get());
        match self.pages.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    async fn open_media(&self, media: &MediaRef) -> Result<MediaByteStream, FetchError> {
        let record_id = media.record_id.get();
        self.media_attempts
            .lock()
            .unwrap()
            .entry(record_id)
            .or_default()
            .push(Instant::now());

        let current = self.media_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.media_in_flight_max.fetch_max(current, Ordering::SeqCst);
        if !self.media_delay.is_zero() {
            tokio::time::sleep(self.media_delay).await;
        }
        self.media_in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = self
            .media
            .lock()
            .unwrap()
            .get_mut(&record_id)
            .and_then(|queue| queue.pop_front());

        match outcome {
            None => Ok(one_chunk(DEFAULT_MEDIA_BYTES.to_vec())),
            Some(MediaOutcome::Bytes(bytes)) => Ok(one_chunk(bytes)),
            Some(MediaOutcome::Fail(error)) => Err(error),
        }
    }
}

fn one_chunk(bytes: Vec<u8>) -> MediaByteStream {
    futures::stream::iter(vec![Ok(Bytes::from(bytes))]).boxed()
}

/// A message with no sender, media, or metrics.
pub(crate) fn message(id: i64) -> RawMessage {
    RawMessage {
        id,
        date: 1_700_000_000 + id,
        sender: Some(RawSender {
            id: 1000 + id,
            first_name: Some(format!("user{id}")),
            ..RawSender::default()
        }),
        body: format!("message {id}"),
        ..RawMessage::default()
    }
}

/// A message carrying a document attachment.
pub(crate) fn message_with_media(id: i64) -> RawMessage {
    RawMessage {
        media: Some(RawMedia {
            kind: MediaKind::Document,
            file_name: Some(format!("file-{id}.bin")),
        }),
        ..message(id)
    }
}

/// Messages with consecutive ids, inclusive on both ends.
pub(crate) fn messages(from: i64, to: i64) -> Vec<RawMessage> {
    (from..=to).map(message).collect()
}

/// Config rooted in a temp dir with retry delays suitable for tests.
pub(crate) fn test_config(data_dir: &std::path::Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Config::default()
    }
}

/// An engine over a fresh store and a scripted source.
///
/// The returned tempdir must be kept alive for the duration of the test.
pub(crate) async fn test_engine(source_name: &str) -> (IngestEngine, Arc<ScriptedSource>, TempDir) {
    test_engine_with(source_name, ScriptedSource::new(), |config| config).await
}

/// Like [`test_engine`], but with a prepared source and a config hook.
pub(crate) async fn test_engine_with(
    source_name: &str,
    source: ScriptedSource,
    configure: impl FnOnce(Config) -> Config,
) -> (IngestEngine, Arc<ScriptedSource>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = configure(test_config(temp_dir.path()));
    let store = Arc::new(Store::open(&config.store_path(source_name)).await.unwrap());
    let client = Arc::new(source);
    let engine = IngestEngine::new(Arc::clone(&client) as Arc<dyn SourceClient>, store, config);
    (engine, client, temp_dir)
}
