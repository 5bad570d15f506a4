//! Frontend status API: `PATCH {base_url}{item_id}` with the item's upload status.

use async_trait::async_trait;
use serde::Serialize;

use super::Notifier;
use crate::config::StatusApiConfig;
use crate::error::{Error, Result};
use crate::types::{CompletionStatus, ItemId};

#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'a str,
}

/// Tells the frontend whether each item was uploaded or failed
///
/// Progress and completion are not relevant to the frontend and are ignored.
pub struct StatusApiNotifier {
    client: reqwest::Client,
    config: StatusApiConfig,
}

impl StatusApiNotifier {
    /// Create a client for the API at `config.base_url`
    pub fn new(config: StatusApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn patch(&self, id: &ItemId, status: &str) -> Result<()> {
        let url = format!("{}{}", self.config.base_url, id);
        let mut request = self.client.patch(&url).json(&StatusBody { status });

        if let Some(auth) = &self.config.auth_header {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "status API returned {} for {}",
                response.status(),
                url
            )));
        }

        tracing::debug!(item_id = %id, status, "status API updated");
        Ok(())
    }
}

#[async_trait]
impl Notifier for StatusApiNotifier {
    async fn progress(&self, _percent: u8) -> Result<()> {
        Ok(())
    }

    async fn item_failed(&self, id: &ItemId) -> Result<()> {
        self.patch(id, "failed").await
    }

    async fn item_completed(&self, id: &ItemId) -> Result<()> {
        self.patch(id, "uploaded").await
    }

    async fn job_completed(&self, _status: CompletionStatus) -> Result<()> {
        Ok(())
    }
}
