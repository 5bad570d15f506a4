//! HTTP webhook notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::Notifier;
use crate::config::{WebhookConfig, WebhookEvent};
use crate::error::{Error, Result};
use crate::types::{CompletionStatus, ItemId};

/// JSON body POSTed to webhooks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// "progress", "item_failed" or "job_completed"
    pub event: String,
    /// Threshold reached, for progress events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    /// Item concerned, for item events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    /// Final verdict, for completion events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Short title suitable for an email subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Human-readable message
    pub message: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
}

impl WebhookPayload {
    fn new(event: &str, message: String) -> Self {
        Self {
            event: event.to_string(),
            percent: None,
            item_id: None,
            status: None,
            subject: None,
            message,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Payload for a crossed progress threshold
    pub fn progress(percent: u8) -> Self {
        Self {
            percent: Some(percent),
            subject: Some(format!("Video Transfer Progress: {}% Complete", percent)),
            ..Self::new(
                "progress",
                format!(
                    "The video transfer process has reached {}% completion.",
                    percent
                ),
            )
        }
    }

    /// Payload for a failed transfer attempt
    pub fn item_failed(id: &ItemId) -> Self {
        Self {
            item_id: Some(id.clone()),
            subject: Some("Video Transfer Failure".to_string()),
            ..Self::new("item_failed", format!("Video {} failed to transfer.", id))
        }
    }

    /// Payload for the end of the job
    pub fn job_completed(status: CompletionStatus) -> Self {
        Self {
            status: Some(status.as_str().to_string()),
            subject: Some("Video Transfer Process Completed".to_string()),
            ..Self::new(
                "job_completed",
                format!("Video transfer process completed with status: {}", status),
            )
        }
    }
}

/// Deliveries buffered ahead of the webhook worker before callers wait
const QUEUE_CAPACITY: usize = 256;

/// One payload waiting for the worker
struct Delivery {
    event_type: WebhookEvent,
    payload: WebhookPayload,
    /// Set when the caller waits for the outcome
    done: Option<oneshot::Sender<Result<()>>>,
}

/// POSTs a [`WebhookPayload`] to every webhook subscribed to the event
///
/// Payloads go through a bounded queue drained by a single worker task, so receivers see
/// events in the order they happened while a slow endpoint only delays the queue, not the
/// caller. Progress and failure events return once queued; the completion event waits for
/// everything queued before it and reports its own delivery errors.
///
/// Must be created inside a Tokio runtime.
pub struct WebhookNotifier {
    queue: mpsc::Sender<Delivery>,
}

impl WebhookNotifier {
    /// Create a notifier for `webhooks` and start its delivery worker
    pub fn new(webhooks: Vec<WebhookConfig>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let (queue, deliveries) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(WebhookWorker { client, webhooks }.run(deliveries));
        Ok(Self { queue })
    }

    async fn enqueue(
        &self,
        event_type: WebhookEvent,
        payload: WebhookPayload,
        done: Option<oneshot::Sender<Result<()>>>,
    ) -> Result<()> {
        self.queue
            .send(Delivery {
                event_type,
                payload,
                done,
            })
            .await
            .map_err(|_| worker_stopped())
    }

    /// Queue `payload` and wait until it and everything before it was delivered
    async fn deliver(&self, event_type: WebhookEvent, payload: WebhookPayload) -> Result<()> {
        let (done, outcome) = oneshot::channel();
        self.enqueue(event_type, payload, Some(done)).await?;
        outcome.await.map_err(|_| worker_stopped())?
    }
}

fn worker_stopped() -> Error {
    Error::Notification("webhook delivery worker has stopped".into())
}

struct WebhookWorker {
    client: reqwest::Client,
    webhooks: Vec<WebhookConfig>,
}

impl WebhookWorker {
    async fn run(self, mut deliveries: mpsc::Receiver<Delivery>) {
        while let Some(delivery) = deliveries.recv().await {
            let result = self.dispatch(delivery.event_type, &delivery.payload).await;
            if let Some(done) = delivery.done {
                // The caller may have given up waiting
                let _ = done.send(result);
            }
        }
        tracing::debug!("webhook delivery worker finished");
    }

    async fn dispatch(&self, event_type: WebhookEvent, payload: &WebhookPayload) -> Result<()> {
        let matching = self
            .webhooks
            .iter()
            .filter(|w| w.events.contains(&event_type));

        let mut errors = Vec::new();
        for webhook in matching {
            if let Err(error_msg) = self.send(webhook, payload).await {
                tracing::warn!(url = %webhook.url, error = %error_msg, "webhook failed");
                errors.push(format!("{}: {}", webhook.url, error_msg));
            } else {
                tracing::debug!(url = %webhook.url, event = %payload.event, "webhook sent successfully");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Notification(errors.join("; ")))
        }
    }

    async fn send(
        &self,
        webhook: &WebhookConfig,
        payload: &WebhookPayload,
    ) -> std::result::Result<(), String> {
        let mut request = self
            .client
            .post(&webhook.url)
            .json(payload)
            .timeout(webhook.timeout);

        if let Some(auth) = &webhook.auth_header {
            request = request.header("Authorization", auth);
        }

        match tokio::time::timeout(webhook.timeout, request.send()).await {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(format!(
                "Webhook returned status {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )),
            Ok(Err(e)) => Err(format!("Failed to send webhook: {}", e)),
            Err(_) => Err(format!("Webhook timed out after {:?}", webhook.timeout)),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn progress(&self, percent: u8) -> Result<()> {
        self.enqueue(WebhookEvent::OnProgress, WebhookPayload::progress(percent), None)
            .await
    }

    async fn item_failed(&self, id: &ItemId) -> Result<()> {
        self.enqueue(WebhookEvent::OnItemFailed, WebhookPayload::item_failed(id), None)
            .await
    }

    async fn job_completed(&self, status: CompletionStatus) -> Result<()> {
        self.deliver(
            WebhookEvent::OnJobCompleted,
            WebhookPayload::job_completed(status),
        )
        .await
    }
}
