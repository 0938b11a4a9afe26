//! Shared helpers for integration tests: a mock source client built purely
//! against the public API.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use msgvault::{
    Config, Direction, FetchError, MediaByteStream, MediaKind, MediaRef, RawMedia, RawMessage,
    RawSender, RecordId, RetryConfig, SourceClient,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Source client serving scripted pages and per-record media scripts.
pub struct MockSource {
    pages: Mutex<VecDeque<Result<Vec<RawMessage>, FetchError>>>,
    media_failures: Mutex<HashMap<i64, VecDeque<FetchError>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            media_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn push_page(&self, messages: Vec<RawMessage>) {
        self.pages.lock().unwrap().push_back(Ok(messages));
    }

    pub fn push_throttle(&self, retry_after: Duration) {
        self.pages
            .lock()
            .unwrap()
            .push_back(Err(FetchError::Throttled { retry_after }));
    }

    /// Fail the next `failures.len()` media opens for this record, in order,
    /// before serving bytes.
    pub fn fail_media(&self, record_id: i64, failures: Vec<FetchError>) {
        self.media_failures
            .lock()
            .unwrap()
            .insert(record_id, failures.into());
    }
}

#[async_trait]
impl SourceClient for MockSource {
    async fn next_page(
        &self,
        _source: &str,
        _after: RecordId,
        _direction: Direction,
    ) -> Result<Vec<RawMessage>, FetchError> {
        match self.pages.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    async fn open_media(&self, media: &MediaRef) -> Result<MediaByteStream, FetchError> {
        let pending = self
            .media_failures
            .lock()
            .unwrap()
            .get_mut(&media.record_id.get())
            .and_then(|queue| queue.pop_front());
        if let Some(error) = pending {
            return Err(error);
        }
        let payload = format!("attachment for {}", media.record_id);
        Ok(futures::stream::iter(vec![Ok(Bytes::from(payload))]).boxed())
    }
}

/// A message with consecutive-id defaults; every third one carries media.
pub fn make_message(id: i64) -> RawMessage {
    let media = (id % 3 == 0).then(|| RawMedia {
        kind: MediaKind::Document,
        file_name: Some(format!("doc-{id}.pdf")),
    });
    RawMessage {
        id,
        date: 1_700_000_000 + id,
        sender: Some(RawSender {
            id: 500,
            first_name: Some("Grace".to_string()),
            last_name: Some("Hopper".to_string()),
            username: Some("grace".to_string()),
        }),
        body: format!("message {id}"),
        media,
        ..RawMessage::default()
    }
}

pub fn make_messages(from: i64, to: i64) -> Vec<RawMessage> {
    (from..=to).map(make_message).collect()
}

/// Config rooted in the given directory with retry delays suitable for tests.
pub fn make_config(data_dir: &std::path::Path) -> Config {
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
