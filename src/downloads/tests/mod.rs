
use crate::downloads::{AttachmentFetcher, DownloadCoordinator, target_file_name};
use crate::store::{NewRecord, Store};
use crate::test_helpers::{self, ScriptedSource};
use crate::types::{DownloadJob, MediaKind, MediaRef, RecordId};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A coordinator over a fresh store and a scripted source.
pub(crate) struct Harness {
    pub(crate) coordinator: DownloadCoordinator,
    pub(crate) source: Arc<ScriptedSource>,
    pub(crate) store: Arc<Store>,
    pub(crate) cancel: CancellationToken,
    pub(crate) temp_dir: TempDir,
}

/// Build a harness with `record_ids` pre-committed as document records, so
/// download jobs have rows to attach their media paths to.
pub(crate) async fn harness(
    max_concurrent: usize,
    source: ScriptedSource,
    record_ids: &[i64],
) -> Harness {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_helpers::test_config(temp_dir.path());
    config.downloads.max_concurrent = max_concurrent;

    let store = Arc::new(Store::open(&config.store_path("src")).await.unwrap());
    let batch: Vec<NewRecord> = record_ids.iter().map(|id| record_with_media(*id)).collect();
    store.commit_batch("src", &batch).await.unwrap();

    let source = Arc::new(source);
    let fetcher = AttachmentFetcher::new(
        Arc::clone(&source) as Arc<dyn crate::source::SourceClient>,
        config.downloads.fetch_timeout,
    );
    let cancel = CancellationToken::new();
    let (event_tx, _) = tokio::sync::broadcast::channel(256);
    let coordinator = DownloadCoordinator::new(
        fetcher,
        Arc::clone(&store),
        &config,
        cancel.clone(),
        event_tx,
    );

    Harness {
        coordinator,
        source,
        store,
        cancel,
        temp_dir,
    }
}

fn record_with_media(id: i64) -> NewRecord {
    NewRecord {
        record_id: RecordId(id),
        date: 1_700_000_000 + id,
        sender_id: None,
        first_name: None,
        last_name: None,
        username: None,
        body: format!("record {id}"),
        media_kind: Some(MediaKind::Document),
        reply_to: None,
        post_author: None,
        views: None,
        forwards: None,
        reactions: None,
    }
}

/// A job for one of the harness's records, targeting the temp media dir.
pub(crate) fn job(harness: &Harness, id: i64) -> DownloadJob {
    let media = MediaRef {
        record_id: RecordId(id),
        kind: MediaKind::Document,
        file_name: Some(format!("file-{id}.bin")),
    };
    let file_name = target_file_name(&media);
    DownloadJob {
        target: harness.temp_dir.path().join("media").join(&file_name),
        manifest_path: format!("media/{file_name}"),
        media,
    }
}
