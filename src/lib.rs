//! # msgvault
//!
//! Resumable archiving of paginated message streams, with concurrent
//! attachment downloads.
//!
//! ## Design Philosophy
//!
//! msgvault is designed to be:
//! - **Resumable** - every batch commits records and cursor in one
//!   transaction, so an interrupted run picks up exactly where it left off
//! - **Polite** - upstream throttling signals are waited out, never fought
//! - **Bounded** - attachment downloads run under an explicit concurrency
//!   limit with backoff on failure
//! - **Library-first** - no CLI or UI; the remote protocol client is a trait
//!   the embedding application implements
//!
//! ## Quick Start
//!
//! ```no_run
//! use msgvault::{
//!     Config, Direction, FetchError, IngestEngine, MediaByteStream, MediaRef, RawMessage,
//!     RecordId, SourceClient, Store,
//! };
//! use std::sync::Arc;
//!
//! struct MySource;
//!
//! #[async_trait::async_trait]
//! impl SourceClient for MySource {
//!     async fn next_page(
//!         &self,
//!         source: &str,
//!         after: RecordId,
//!         direction: Direction,
//!     ) -> Result<Vec<RawMessage>, FetchError> {
//!         todo!("pull a page from your upstream API")
//!     }
//!
//!     async fn open_media(&self, media: &MediaRef) -> Result<MediaByteStream, FetchError> {
//!         todo!("open the byte stream for a media reference")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = Arc::new(Store::open(&config.store_path("announcements")).await?);
//!     let engine = IngestEngine::new(Arc::new(MySource), store, config);
//!
//!     let summary = engine.run("announcements").await?;
//!     println!(
//!         "archived {} records, {} attachments",
//!         summary.processed, summary.downloads.succeeded
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Bounded-concurrency download pool and attachment fetcher
pub mod downloads;
/// Error types
pub mod error;
/// Ingestion engine
pub mod ingest;
/// Resumption offsets over the store's cursor rows
pub mod progress;
/// Retry policy for remote fetch failures
pub mod retry;
/// Remote source abstraction
pub mod source;
/// SQLite persistence layer
pub mod store;
/// Core types
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{Config, DownloadsConfig, IngestConfig, RetryConfig};
pub use downloads::{AttachmentFetcher, DownloadCoordinator};
pub use error::{Error, FetchError, Result, StoreError};
pub use ingest::IngestEngine;
pub use progress::ProgressTracker;
pub use source::{MediaByteStream, RawMedia, RawMessage, RawSender, Reaction, SourceClient};
pub use store::{MediaStats, NewRecord, Record, RecordFilter, SourceCursor, Store};
pub use types::{
    Direction, DownloadJob, DrainOutcome, Event, MediaKind, MediaRef, RecordId, RunSummary,
};

/// Run a full archiving pass with graceful signal handling
///
/// Cancels the engine on a termination signal and waits for it to settle: the
/// cursor stays at its last committed value and admitted downloads finish
/// before the (partial) summary is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with a ctrl_c fallback if
///   signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(engine: &IngestEngine, source: &str) -> Result<RunSummary> {
    let run = engine.run(source);
    tokio::pin!(run);

    tokio::select! {
        summary = &mut run => summary,
        _ = wait_for_signal() => {
            tracing::info!(source, "termination signal received, cancelling run");
            engine.cancellation_token().cancel();
            run.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        _ => {
            tracing::warn!("Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
