//! Configuration types for msgvault

use crate::error::{Error, Result};
use crate::types::Direction;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ingestion behavior configuration (batching, ordering, pull timeout)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Records accumulated in memory before a transactional flush (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pagination direction, fixed per source across resumptions
    #[serde(default)]
    pub direction: Direction,

    /// Bounded wait for a single page pull before it is classified as a
    /// transient failure (default: 30 seconds)
    #[serde(default = "default_pull_timeout", with = "duration_ms")]
    pub pull_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            direction: Direction::default(),
            pull_timeout: default_pull_timeout(),
        }
    }
}

/// Attachment download configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Whether attachments are downloaded at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum downloads in flight at once (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Bounded wait for opening a media stream or reading one chunk before
    /// the attempt is classified as a transient failure (default: 60 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_ms")]
    pub fetch_timeout: Duration,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: default_max_concurrent(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

/// Retry configuration for transient failures
///
/// Throttling signals are exempt from `max_attempts`: the retry policy waits
/// them out indefinitely, sleeping at least the signaled duration each time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts for transient failures (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before the first retry (default: 500 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the ingestion engine
///
/// Sub-config fields are flattened for backward-compatible serialization, so
/// the JSON format stays flat (no nesting).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root directory; each source gets its own subdirectory with a store
    /// database and a media folder (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Ingestion behavior settings
    #[serde(flatten)]
    pub ingest: IngestConfig,

    /// Attachment download settings
    #[serde(flatten)]
    pub downloads: DownloadsConfig,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ingest: IngestConfig::default(),
            downloads: DownloadsConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
                key: Some("batch_size".to_string()),
            });
        }
        if self.downloads.max_concurrent == 0 {
            return Err(Error::Config {
                message: "max_concurrent must be at least 1".to_string(),
                key: Some("max_concurrent".to_string()),
            });
        }
        if self.ingest.pull_timeout.is_zero() || self.downloads.fetch_timeout.is_zero() {
            return Err(Error::Config {
                message: "timeouts must be non-zero".to_string(),
                key: Some("pull_timeout".to_string()),
            });
        }
        Ok(())
    }

    /// Directory holding everything for one source
    pub fn source_dir(&self, source: &str) -> PathBuf {
        self.data_dir.join(source)
    }

    /// Path of the source's store database file
    pub fn store_path(&self, source: &str) -> PathBuf {
        self.source_dir(source).join(format!("{source}.db"))
    }

    /// Directory the source's attachments are written to
    pub fn media_dir(&self, source: &str) -> PathBuf {
        self.source_dir(source).join("media")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_batch_size() -> usize {
    100
}

fn default_pull_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrent() -> usize {
    5
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

/// Serialize durations as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.ingest.batch_size, 100);
        assert_eq!(config.ingest.direction, Direction::OldestFirst);
        assert_eq!(config.downloads.max_concurrent, 5);
        assert!(config.downloads.enabled);
        assert_eq!(config.retry.max_attempts, 3);
        config.validate().unwrap();
    }

    #[test]
    fn empty_json_fills_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.ingest.batch_size, 100);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn flat_overrides_are_honored() {
        let config: Config =
            serde_json::from_str(r#"{"batch_size": 25, "max_concurrent": 2, "pull_timeout": 5000}"#)
                .unwrap();
        assert_eq!(config.ingest.batch_size, 25);
        assert_eq!(config.downloads.max_concurrent, 2);
        assert_eq!(config.ingest.pull_timeout, Duration::from_secs(5));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = Config {
            ingest: IngestConfig {
                batch_size: 0,
                ..IngestConfig::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Config { key: Some(k), .. }) if k == "batch_size"
        ));
    }

    #[test]
    fn source_paths_are_keyed_by_source() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/vault"),
            ..Config::default()
        };
        assert_eq!(
            config.store_path("alerts"),
            PathBuf::from("/tmp/vault/alerts/alerts.db")
        );
        assert_eq!(
            config.media_dir("alerts"),
            PathBuf::from("/tmp/vault/alerts/media")
        );
    }
}
