//! rclone-backed transfer between two configured remotes

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use super::Transfer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::Item;

/// Copies items with `rclone copyto <source_remote>/<locator> <destination_remote>/<key>`
///
/// rclone streams between the remotes itself, so the work directory is unused.
pub struct RcloneTransfer {
    binary_path: PathBuf,
    source_remote: String,
    destination_remote: String,
    key_prefix: Option<String>,
    timeout: Duration,
}

impl RcloneTransfer {
    /// Create a transfer using an explicit rclone binary
    pub fn new(
        binary_path: PathBuf,
        source_remote: impl Into<String>,
        destination_remote: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            binary_path,
            source_remote: source_remote.into(),
            destination_remote: destination_remote.into(),
            key_prefix: None,
            timeout,
        }
    }

    /// Create a transfer from configuration, locating rclone on PATH when no binary is set
    pub fn from_config(config: &Config) -> Result<Self> {
        let rclone = &config.transfer.rclone;
        let binary_path = match &rclone.binary_path {
            Some(path) => path.clone(),
            None if rclone.search_path => which::which("rclone").map_err(|_| {
                Error::NotSupported(
                    "rclone transfer selected but rclone was not found in PATH".into(),
                )
            })?,
            None => {
                return Err(Error::NotSupported(
                    "rclone transfer selected but no binary_path is configured".into(),
                ));
            }
        };

        let mut transfer = Self::new(
            binary_path,
            rclone.source_remote.clone(),
            rclone.destination_remote.clone(),
            config.transfer.io_timeout,
        );
        transfer.key_prefix = config.destination.key_prefix.clone();
        Ok(transfer)
    }

    fn destination_key(&self, key: &str) -> String {
        match self.key_prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, key),
            _ => key.to_string(),
        }
    }

    /// Arguments passed to rclone for `item`
    pub(crate) fn command_args(&self, item: &Item) -> Vec<String> {
        vec![
            "copyto".to_string(),
            join_remote(&self.source_remote, &item.source_locator),
            join_remote(
                &self.destination_remote,
                &self.destination_key(&item.destination_key),
            ),
        ]
    }

    async fn run(&self, item: &Item) -> Result<()> {
        let child = Command::new(&self.binary_path)
            .args(self.command_args(item))
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| Error::ExternalTool(format!("rclone timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::ExternalTool(format!("Failed to execute rclone: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ExternalTool(format!(
                "rclone exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// `remote:` is a bucket root and takes no separator; anything else is joined with `/`
fn join_remote(remote: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if remote.is_empty() {
        path.to_string()
    } else if remote.ends_with(':') || remote.ends_with('/') {
        format!("{}{}", remote, path)
    } else {
        format!("{}/{}", remote, path)
    }
}

#[async_trait]
impl Transfer for RcloneTransfer {
    async fn transfer(&self, item: &Item, _work_dir: &Path) -> bool {
        match self.run(item).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "rclone transfer failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "rclone"
    }
}
