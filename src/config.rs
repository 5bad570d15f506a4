//! Configuration types for video-migrate

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// How a single item's bytes are moved
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    /// Stream the source URL into a temp file, then upload it to the destination store
    #[default]
    Http,
    /// Delegate the copy to `rclone copyto` between two configured remotes
    Rclone,
}

/// Per-item transfer behavior (work directory, throttling, timeouts)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Directory for temporary download files (default: "./temp")
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Transfer mechanism (default: http)
    #[serde(default)]
    pub method: TransferMethod,

    /// Transfers allowed in flight during the first pass (default: 1, sequential)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_transfers: usize,

    /// Pause before starting each item, throttles outbound requests (default: 500 ms)
    #[serde(default = "default_item_delay", with = "duration_ms_serde")]
    pub item_delay: Duration,

    /// Upper bound on one transfer's network I/O (default: 30 minutes)
    #[serde(default = "default_io_timeout", with = "duration_serde")]
    pub io_timeout: Duration,

    /// TCP connect timeout for source downloads (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// rclone settings, used when `method` is `rclone`
    #[serde(default)]
    pub rclone: RcloneConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            method: TransferMethod::default(),
            max_concurrent_transfers: default_max_concurrent(),
            item_delay: default_item_delay(),
            io_timeout: default_io_timeout(),
            connect_timeout: default_connect_timeout(),
            rclone: RcloneConfig::default(),
        }
    }
}

/// rclone remotes and binary location
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RcloneConfig {
    /// Path to the rclone executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Whether to search PATH for rclone when `binary_path` is not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Remote holding the source objects, e.g. "aliyun:test-ali-video"
    #[serde(default)]
    pub source_remote: String,

    /// Remote receiving the objects, e.g. "aws_s3:ali-video-storing-bucket"
    #[serde(default)]
    pub destination_remote: String,
}

impl Default for RcloneConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            search_path: true,
            source_remote: String::new(),
            destination_remote: String::new(),
        }
    }
}

/// Retry policy for failed items
///
/// Retries are bounded per item and sequential: an item is attempted at most
/// `retry_limit + 1` times before it is reported as permanently failed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts allowed per item after the first failure (default: 5)
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Fixed pause before each retry attempt (default: 2 seconds)
    #[serde(default = "default_retry_delay", with = "duration_ms_serde")]
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// Progress, failure and completion notification settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Progress notifications fire every `progress_step` percent (default: 10)
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,

    /// Webhook configurations
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,

    /// Frontend status API, PATCHed with each item's outcome
    #[serde(default)]
    pub status_api: Option<StatusApiConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            progress_step: default_progress_step(),
            webhooks: vec![],
            status_api: None,
        }
    }
}

/// Webhook configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Events that trigger this webhook
    pub events: Vec<WebhookEvent>,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Webhook trigger event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    /// Triggered when a progress threshold is crossed
    OnProgress,
    /// Triggered on every failed transfer attempt
    OnItemFailed,
    /// Triggered once when the job finishes
    OnJobCompleted,
}

/// Frontend status API (`PATCH {base_url}{item_id}`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusApiConfig {
    /// Base URL the item id is appended to
    pub base_url: String,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Request timeout (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Item store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./video-migrate.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// How long a run lease stays valid without renewal (default: 5 minutes)
    ///
    /// A running job renews its lease every third of this, so the value bounds how long a
    /// crashed run keeps others out, not how long a run may last.
    #[serde(default = "default_run_lock_ttl", with = "duration_serde")]
    pub run_lock_ttl: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            run_lock_ttl: default_run_lock_ttl(),
        }
    }
}

/// Object store backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackend {
    /// Amazon S3 or an S3-compatible service; credentials come from the environment
    S3 {
        /// Bucket name
        bucket: String,
        /// Region (e.g. "ap-southeast-2")
        region: String,
        /// Custom endpoint for S3-compatible providers
        #[serde(default)]
        endpoint: Option<String>,
    },
    /// A directory on the local filesystem
    Local {
        /// Root directory (created if missing)
        root: PathBuf,
    },
    /// Process-local in-memory store
    Memory,
}

/// Where transferred objects land
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Storage backend
    #[serde(default = "default_destination_backend")]
    pub backend: StoreBackend,

    /// Prefix prepended to every destination key (e.g. "ali-videos")
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            backend: default_destination_backend(),
            key_prefix: None,
        }
    }
}

/// Failure log file and its durable copy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureLogConfig {
    /// Local log file (default: "./failed_videos.log")
    #[serde(default = "default_failure_log_path")]
    pub local_path: PathBuf,

    /// Upload the log after every append (default: true)
    #[serde(default = "default_true")]
    pub upload: bool,

    /// Key of the uploaded copy (default: "logs/failed_videos.log")
    #[serde(default = "default_failure_log_key")]
    pub remote_key: String,

    /// Store receiving the log; the destination store is used when None
    #[serde(default)]
    pub store: Option<StoreBackend>,
}

impl Default for FailureLogConfig {
    fn default() -> Self {
        Self {
            local_path: default_failure_log_path(),
            upload: true,
            remote_key: default_failure_log_key(),
            store: None,
        }
    }
}

/// Main configuration
///
/// Every field has a default, so `Config::default()` describes a sequential job that
/// streams HTTP sources into `./destination` with a retry limit of 5.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Per-item transfer behavior
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Notification channels
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Item store
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Destination object store
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Failure log
    #[serde(default)]
    pub failure_log: FailureLogConfig,
}

impl Config {
    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.transfer.max_concurrent_transfers == 0 {
            return Err(config_error(
                "max_concurrent_transfers must be at least 1",
                "transfer.max_concurrent_transfers",
            ));
        }

        if self.persistence.run_lock_ttl < Duration::from_secs(1) {
            return Err(config_error(
                "run_lock_ttl must be at least 1 second",
                "persistence.run_lock_ttl",
            ));
        }

        if self.notifications.progress_step == 0 || self.notifications.progress_step > 100 {
            return Err(config_error(
                "progress_step must be between 1 and 100",
                "notifications.progress_step",
            ));
        }

        for webhook in &self.notifications.webhooks {
            url::Url::parse(&webhook.url).map_err(|e| {
                config_error(
                    format!("invalid webhook url '{}': {}", webhook.url, e),
                    "notifications.webhooks",
                )
            })?;
        }

        if let Some(api) = &self.notifications.status_api {
            url::Url::parse(&api.base_url).map_err(|e| {
                config_error(
                    format!("invalid status api url '{}': {}", api.base_url, e),
                    "notifications.status_api.base_url",
                )
            })?;
        }

        if let StoreBackend::S3 { bucket, .. } = &self.destination.backend
            && bucket.trim().is_empty()
        {
            return Err(config_error(
                "S3 bucket must not be empty",
                "destination.backend.bucket",
            ));
        }

        if self.transfer.method == TransferMethod::Rclone
            && (self.transfer.rclone.source_remote.is_empty()
                || self.transfer.rclone.destination_remote.is_empty())
        {
            return Err(config_error(
                "rclone transfers need both source_remote and destination_remote",
                "transfer.rclone",
            ));
        }

        Ok(())
    }

    /// Full destination key for an item, with the configured prefix applied
    pub fn destination_path(&self, destination_key: &str) -> String {
        let key = destination_key.trim_start_matches('/');
        match self.destination.key_prefix.as_deref() {
            Some(prefix) if !prefix.trim_matches('/').is_empty() => {
                format!("{}/{}", prefix.trim_matches('/'), key)
            }
            _ => key.to_string(),
        }
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_max_concurrent() -> usize {
    1
}

fn default_item_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_io_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_limit() -> u32 {
    5
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_progress_step() -> u8 {
    10
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("video-migrate.db")
}

fn default_run_lock_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_destination_backend() -> StoreBackend {
    StoreBackend::Local {
        root: PathBuf::from("destination"),
    }
}

fn default_failure_log_path() -> PathBuf {
    PathBuf::from("failed_videos.log")
}

fn default_failure_log_key() -> String {
    "logs/failed_videos.log".to_string()
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds), for short throttling delays
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
