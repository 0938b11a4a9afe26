//! Error types for msgvault
//!
//! Three layers of errors cover the system:
//! - [`Error`] — the crate-wide error type returned by engine and store operations
//! - [`FetchError`] — the remote-boundary taxonomy (throttled / transient / permanent)
//!   that drives the retry policy
//! - [`StoreError`] — persistence failures (connection, migration, query)

use std::time::Duration;
use thiserror::Error;

/// Result type alias for msgvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for msgvault
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// Store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// SQLx database error
    #[error("store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Remote fetch failed with a terminal classification
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local store inconsistency: the cursor claims progress the records table
    /// does not hold. Ingestion for the source halts until an explicit reset.
    #[error("store corruption for source {source_id}: {detail}")]
    Corruption {
        /// The source whose store is inconsistent
        source_id: String,
        /// Description of the inconsistency
        detail: String,
    },

    /// Shutdown in progress - not accepting new download jobs
    #[error("shutdown in progress: not accepting new download jobs")]
    ShuttingDown,
}

/// Store-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open the store
    #[error("failed to open store: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Classification of remote fetch failures
///
/// Every failure crossing the remote boundary is classified here, and the
/// classification fully determines retry behavior: throttling is always
/// retried after the signaled delay, transient failures are retried with
/// bounded exponential backoff, permanent failures are never retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The source signaled a rate limit with an explicit wait duration
    #[error("throttled by source, retry after {}s", retry_after.as_secs())]
    Throttled {
        /// Minimum duration to wait before the next attempt
        retry_after: Duration,
    },

    /// Network or timeout condition; worth retrying a bounded number of times
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Not-found / forbidden / malformed reference; retrying cannot help
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    /// Classify a local I/O failure on the download path as transient
    pub fn io(err: &std::io::Error) -> Self {
        FetchError::Transient(format!("I/O failure: {err}"))
    }
}
