//! Failure log
//!
//! Every failed transfer attempt is appended to a plain-text file and the whole file is
//! copied to durable storage right away, so an operator can see failures while a long job
//! is still running and after the machine running it is gone.
//!
//! ```text
//! Failed Videos Log
//! =================
//! course/intro.mp4 failed to transfer after 12.34s
//! course/intro.mp4 failed to transfer after 3.10s (retries exhausted)
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, PutPayload};
use object_store::path::Path as ObjectPath;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::FailureLogConfig;
use crate::error::Result;
use crate::transfer::build_object_store;
use crate::types::ItemId;

/// First line of every failure log
pub const HEADER: &str = "Failed Videos Log";

/// What a failure log entry records
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The attempt failed and the item may be retried
    Failed,
    /// The attempt failed and the item has no retries left
    RetriesExhausted,
}

/// One failed transfer attempt
#[derive(Clone, Debug, PartialEq)]
pub struct FailureLogEntry {
    /// Item whose transfer failed
    pub item_id: ItemId,
    /// Whether retries remain
    pub outcome: FailureOutcome,
    /// Wall time spent on the attempt
    pub duration: Duration,
    /// Context for structured logs (attempt number, pass); not written to the file
    pub message: String,
}

impl FailureLogEntry {
    /// Text written to the log for this entry, without a trailing newline
    pub fn line(&self) -> String {
        let mut line = format!(
            "{} failed to transfer after {:.2}s",
            self.item_id,
            self.duration.as_secs_f64()
        );
        if self.outcome == FailureOutcome::RetriesExhausted {
            line.push_str(" (retries exhausted)");
        }
        line
    }
}

/// Header block a reset log starts with
pub fn header() -> String {
    format!("{}\n{}\n", HEADER, "=".repeat(HEADER.len()))
}

/// Append-only sink for failure entries
#[async_trait]
pub trait FailureLog: Send + Sync {
    /// Truncate the log and write the header
    async fn reset(&self) -> Result<()>;

    /// Append one entry
    async fn append(&self, entry: &FailureLogEntry) -> Result<()>;

    /// Make everything appended so far durable
    async fn flush(&self) -> Result<()>;
}

/// Local file, optionally mirrored to an object store on every flush
pub struct FileFailureLog {
    local_path: PathBuf,
    remote: Option<(Arc<dyn ObjectStore>, ObjectPath)>,
    // Serializes writes and uploads so the uploaded copy is never a torn read
    lock: Mutex<()>,
}

impl FileFailureLog {
    /// Log to `local_path` only
    pub fn new(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            remote: None,
            lock: Mutex::new(()),
        }
    }

    /// Upload the whole file to `key` in `store` on every flush
    pub fn with_upload(mut self, store: Arc<dyn ObjectStore>, key: &str) -> Self {
        self.remote = Some((store, ObjectPath::from(key)));
        self
    }

    /// Build from configuration; `destination` receives the log unless a dedicated store is set
    pub fn from_config(config: &FailureLogConfig, destination: Arc<dyn ObjectStore>) -> Result<Self> {
        let log = Self::new(&config.local_path);
        if !config.upload {
            return Ok(log);
        }

        let store = match &config.store {
            Some(backend) => build_object_store(backend)?,
            None => destination,
        };
        Ok(log.with_upload(store, &config.remote_key))
    }

    /// Local log file
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.local_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FailureLog for FileFailureLog {
    async fn reset(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_parent().await?;
        tokio::fs::write(&self.local_path, header()).await?;
        tracing::debug!(path = %self.local_path.display(), "failure log reset");
        Ok(())
    }

    async fn append(&self, entry: &FailureLogEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_parent().await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.local_path)
            .await?;
        file.write_all(format!("{}\n", entry.line()).as_bytes())
            .await?;
        file.flush().await?;

        tracing::debug!(
            item_id = %entry.item_id,
            outcome = ?entry.outcome,
            context = %entry.message,
            "failure logged"
        );
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some((store, key)) = &self.remote else {
            return Ok(());
        };

        let _guard = self.lock.lock().await;
        let contents = tokio::fs::read(&self.local_path).await?;
        store.put(key, PutPayload::from(Bytes::from(contents))).await?;
        tracing::debug!(key = %key, "failure log uploaded");
        Ok(())
    }
}

/// In-memory failure log
///
/// Useful for embedding the orchestrator where no file should be written.
#[derive(Default)]
pub struct MemoryFailureLog {
    lines: std::sync::Mutex<Vec<String>>,
    flushes: std::sync::atomic::AtomicUsize,
}

impl MemoryFailureLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries appended since the last reset
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Number of flushes so far
    pub fn flush_count(&self) -> usize {
        self.flushes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl FailureLog for MemoryFailureLog {
    async fn reset(&self) -> Result<()> {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
        Ok(())
    }

    async fn append(&self, entry: &FailureLogEntry) -> Result<()> {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(entry.line());
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flushes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
