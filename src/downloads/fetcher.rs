//! Attachment retrieval with atomic finalization
//!
//! Bytes stream into `<target>.part` and only an atomic rename makes them
//! visible under the final name, so observers never see a partially written
//! attachment. Re-fetching the same target overwrites it safely.

use crate::error::FetchError;
use crate::source::SourceClient;
use crate::types::MediaRef;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Retrieves one attachment's bytes from the remote source onto disk
pub struct AttachmentFetcher {
    client: Arc<dyn SourceClient>,
    fetch_timeout: Duration,
}

impl AttachmentFetcher {
    /// Create a fetcher over the given source client
    pub fn new(client: Arc<dyn SourceClient>, fetch_timeout: Duration) -> Self {
        Self {
            client,
            fetch_timeout,
        }
    }

    /// Stream the media's bytes to `target`, returning the bytes written
    ///
    /// Opening the stream and each chunk read are bounded by the fetch
    /// timeout; elapsing classifies as [`FetchError::Transient`]. On any
    /// failure the partial `.part` file is removed best-effort and the final
    /// path is left untouched.
    pub async fn fetch(&self, media: &MediaRef, target: &Path) -> Result<u64, FetchError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(&e))?;
        }

        let part = part_path(target);
        match self.write_stream(media, &part).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, target)
                    .await
                    .map_err(|e| FetchError::io(&e))?;
                tracing::debug!(
                    record_id = %media.record_id,
                    bytes,
                    target = %target.display(),
                    "attachment written"
                );
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn write_stream(&self, media: &MediaRef, part: &Path) -> Result<u64, FetchError> {
        let mut stream = tokio::time::timeout(self.fetch_timeout, self.client.open_media(media))
            .await
            .map_err(|_| FetchError::Transient("opening media stream timed out".to_string()))??;

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| FetchError::io(&e))?;
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::time::timeout(self.fetch_timeout, stream.next())
                .await
                .map_err(|_| FetchError::Transient("media stream read timed out".to_string()))?;
            match chunk {
                None => break,
                Some(chunk) => {
                    let chunk = chunk?;
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| FetchError::io(&e))?;
                    written += chunk.len() as u64;
                }
            }
        }

        file.flush().await.map_err(|e| FetchError::io(&e))?;
        file.sync_all().await.map_err(|e| FetchError::io(&e))?;
        Ok(written)
    }
}

/// Scratch path the bytes stream into before the atomic rename
pub(crate) fn part_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    target.with_file_name(format!("{name}.part"))
}

/// File name an attachment is stored under: the owning record's identifier
/// prefixed onto the (sanitized) original name, with a per-kind default when
/// the source provides no name
pub fn target_file_name(media: &MediaRef) -> String {
    let raw = media
        .file_name
        .as_deref()
        .unwrap_or_else(|| media.kind.default_file_name());
    let sanitized: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        format!("{}-{}", media.record_id, media.kind.default_file_name())
    } else {
        format!("{}-{}", media.record_id, sanitized)
    }
}
