//! Test configuration rooted in a temporary directory

use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use video_migrate::{Config, StoreBackend};

/// Paths of a test workspace
pub struct TestWorkspace {
    /// Keeps the directory alive for the duration of the test
    pub dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Root of the local destination store
    pub fn destination_root(&self) -> PathBuf {
        self.dir.path().join("destination")
    }

    /// Scratch directory for in-flight downloads
    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// Local failure log file
    pub fn failure_log(&self) -> PathBuf {
        self.dir.path().join("failed_videos.log")
    }

    /// Item store database
    pub fn database(&self) -> PathBuf {
        self.dir.path().join("items.db")
    }

    /// Configuration with every path inside the workspace and no waiting between attempts
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.transfer.work_dir = self.work_dir();
        config.transfer.item_delay = Duration::ZERO;
        config.transfer.io_timeout = Duration::from_secs(10);
        config.retry.retry_limit = 2;
        config.retry.retry_delay = Duration::from_millis(10);
        config.persistence.database_path = self.database();
        config.destination.backend = StoreBackend::Local {
            root: self.destination_root(),
        };
        config.destination.key_prefix = Some("ali-videos".to_string());
        config.failure_log.local_path = self.failure_log();
        config
    }
}
