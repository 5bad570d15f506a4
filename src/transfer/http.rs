//! HTTP source → object store destination, streamed through a temp file.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use object_store::path::Path as ObjectPath;
use object_store::{MultipartUpload, ObjectStore, PutPayload};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

use super::Transfer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::Item;

/// Size of each multipart part (S3 needs at least 5 MiB for all but the last)
const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Multipart parts allowed in flight at once
const MAX_IN_FLIGHT_PARTS: usize = 4;

/// Bound on the abort request sent after a failed or expired upload
const ABORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads `source_locator` over HTTP and uploads it under `destination_key`
///
/// Source objects are large media files, so the body is never held in memory: it is
/// written chunk by chunk to a temp file in the work directory and then streamed into a
/// multipart upload. Download and upload share one `io_timeout` deadline. An upload that
/// fails or runs past it is aborted, and the temp file is removed whatever the outcome.
pub struct HttpTransfer {
    client: reqwest::Client,
    destination: Arc<dyn ObjectStore>,
    config: Arc<Config>,
}

impl HttpTransfer {
    /// Create a transfer with an HTTP client bound by the configured timeouts
    pub fn new(config: Arc<Config>, destination: Arc<dyn ObjectStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.transfer.connect_timeout)
            .timeout(config.transfer.io_timeout)
            .build()?;

        Ok(Self {
            client,
            destination,
            config,
        })
    }

    async fn try_transfer(&self, item: &Item, work_dir: &Path) -> Result<u64> {
        let deadline = Instant::now() + self.config.transfer.io_timeout;
        let url = url::Url::parse(&item.source_locator).map_err(|e| {
            Error::Other(format!(
                "invalid source locator '{}': {}",
                item.source_locator, e
            ))
        })?;

        tokio::fs::create_dir_all(work_dir).await?;
        let temp = tempfile::Builder::new()
            .prefix("transfer-")
            .suffix(".part")
            .tempfile_in(work_dir)?;

        let result = async {
            let bytes = tokio::time::timeout_at(deadline, self.download(url, temp.path()))
                .await
                .map_err(|_| self.timed_out("download"))??;
            let key = self.config.destination_path(&item.destination_key);
            self.upload(temp.path(), &key, deadline).await?;
            Ok(bytes)
        }
        .await;

        if let Err(e) = temp.close() {
            tracing::warn!(item_id = %item.id, error = %e, "failed to remove temp file");
        }

        result
    }

    async fn download(&self, url: url::Url, path: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    /// Upload `path` under `key`, aborting the multipart upload on error or at `deadline`
    async fn upload(&self, path: &Path, key: &str, deadline: Instant) -> Result<()> {
        let location = ObjectPath::from(key);
        let mut upload = self.destination.put_multipart(&location).await?;

        let error = match tokio::time::timeout_at(deadline, send_parts(path, upload.as_mut())).await
        {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => self.timed_out("upload"),
        };

        match tokio::time::timeout(ABORT_TIMEOUT, upload.abort()).await {
            Ok(Ok(())) => tracing::debug!(key = %key, "multipart upload aborted"),
            Ok(Err(e)) => tracing::warn!(key = %key, error = %e, "failed to abort multipart upload"),
            Err(_) => tracing::warn!(key = %key, "multipart abort timed out"),
        }
        Err(error)
    }

    fn timed_out(&self, phase: &str) -> Error {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!(
                "{} exceeded the {:?} I/O timeout",
                phase, self.config.transfer.io_timeout
            ),
        ))
    }
}

/// Stream the file into `upload` part by part and complete it
async fn send_parts(path: &Path, upload: &mut dyn MultipartUpload) -> Result<()> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut in_flight = FuturesUnordered::new();
    let mut sent = 0usize;

    loop {
        let part = read_part(&mut file).await?;
        // An empty file still needs one part
        if part.is_empty() && sent > 0 {
            break;
        }
        while in_flight.len() >= MAX_IN_FLIGHT_PARTS {
            if let Some(done) = in_flight.next().await {
                done?;
            }
        }
        let last = part.len() < UPLOAD_CHUNK_SIZE;
        in_flight.push(upload.put_part(PutPayload::from(part)));
        sent += 1;
        if last {
            break;
        }
    }

    while let Some(done) = in_flight.next().await {
        done?;
    }
    upload.complete().await?;
    Ok(())
}

/// Read up to one part, short only at end of file
async fn read_part(file: &mut tokio::fs::File) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(UPLOAD_CHUNK_SIZE);
    (&mut *file)
        .take(UPLOAD_CHUNK_SIZE as u64)
        .read_to_end(&mut buf)
        .await?;
    Ok(Bytes::from(buf))
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn transfer(&self, item: &Item, work_dir: &Path) -> bool {
        match self.try_transfer(item, work_dir).await {
            Ok(bytes) => {
                tracing::debug!(item_id = %item.id, bytes, "transfer succeeded");
                true
            }
            Err(e) => {
                tracing::warn!(
                    item_id = %item.id,
                    code = e.error_code(),
                    error = %e,
                    "transfer failed"
                );
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
