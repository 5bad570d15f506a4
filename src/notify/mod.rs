//! Notification channels
//!
//! The orchestrator reports progress thresholds, per-attempt failures, per-item successes
//! and the final verdict through a single [`Notifier`]. Delivery is best-effort: an `Err`
//! is logged by the caller and never changes the outcome of a job.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::NotificationConfig;
use crate::types::{CompletionStatus, Event, ItemId};

mod status_api;
mod webhook;

pub use status_api::StatusApiNotifier;
pub use webhook::{WebhookNotifier, WebhookPayload};

/// Receives job lifecycle signals
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A progress threshold (0, step, 2*step, ..., 100) was reached
    async fn progress(&self, percent: u8) -> crate::Result<()>;

    /// A transfer attempt for `id` failed
    async fn item_failed(&self, id: &ItemId) -> crate::Result<()>;

    /// `id` reached the destination
    async fn item_completed(&self, _id: &ItemId) -> crate::Result<()> {
        Ok(())
    }

    /// The job finished
    async fn job_completed(&self, status: CompletionStatus) -> crate::Result<()>;
}

/// Notifier that drops everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn progress(&self, _percent: u8) -> crate::Result<()> {
        Ok(())
    }

    async fn item_failed(&self, _id: &ItemId) -> crate::Result<()> {
        Ok(())
    }

    async fn job_completed(&self, _status: CompletionStatus) -> crate::Result<()> {
        Ok(())
    }
}

/// Publishes [`Event`]s on a tokio broadcast channel
///
/// Sending with no subscribers is not an error.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    event_tx: broadcast::Sender<Event>,
}

impl ChannelNotifier {
    /// Create a notifier with its own channel of the given capacity
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _rx) = broadcast::channel(capacity);
        Self { event_tx }
    }

    /// Wrap an existing sender
    pub fn from_sender(event_tx: broadcast::Sender<Event>) -> Self {
        Self { event_tx }
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn progress(&self, percent: u8) -> crate::Result<()> {
        self.emit(Event::Progress { percent });
        Ok(())
    }

    async fn item_failed(&self, id: &ItemId) -> crate::Result<()> {
        self.emit(Event::ItemFailed { id: id.clone() });
        Ok(())
    }

    async fn item_completed(&self, id: &ItemId) -> crate::Result<()> {
        self.emit(Event::ItemCompleted { id: id.clone() });
        Ok(())
    }

    async fn job_completed(&self, status: CompletionStatus) -> crate::Result<()> {
        self.emit(Event::JobCompleted { status });
        Ok(())
    }
}

/// Forwards every signal to each inner notifier in order
///
/// All notifiers are called even when an earlier one fails; the first error is returned.
#[derive(Clone, Default)]
pub struct CompositeNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl CompositeNotifier {
    /// Create a composite over `notifiers`
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    /// Append another notifier
    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Number of inner notifiers
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// True when there are no inner notifiers
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

fn first_error(results: Vec<crate::Result<()>>) -> crate::Result<()> {
    results.into_iter().find(|r| r.is_err()).unwrap_or(Ok(()))
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn progress(&self, percent: u8) -> crate::Result<()> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for n in &self.notifiers {
            results.push(n.progress(percent).await);
        }
        first_error(results)
    }

    async fn item_failed(&self, id: &ItemId) -> crate::Result<()> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for n in &self.notifiers {
            results.push(n.item_failed(id).await);
        }
        first_error(results)
    }

    async fn item_completed(&self, id: &ItemId) -> crate::Result<()> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for n in &self.notifiers {
            results.push(n.item_completed(id).await);
        }
        first_error(results)
    }

    async fn job_completed(&self, status: CompletionStatus) -> crate::Result<()> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for n in &self.notifiers {
            results.push(n.job_completed(status).await);
        }
        first_error(results)
    }
}

/// Build the notifier described by `config`
///
/// Events always go to `event_tx` when given; webhooks and the status API are added when
/// configured.
pub fn build_notifier(
    config: &NotificationConfig,
    event_tx: Option<broadcast::Sender<Event>>,
) -> crate::Result<Arc<dyn Notifier>> {
    let mut composite = CompositeNotifier::default();

    if let Some(tx) = event_tx {
        composite.push(Arc::new(ChannelNotifier::from_sender(tx)));
    }

    if !config.webhooks.is_empty() {
        composite.push(Arc::new(WebhookNotifier::new(config.webhooks.clone())?));
    }

    if let Some(api) = &config.status_api {
        composite.push(Arc::new(StatusApiNotifier::new(api.clone())?));
    }

    tracing::debug!(channels = composite.len(), "notifier ready");

    if composite.is_empty() {
        Ok(Arc::new(NoOpNotifier))
    } else {
        Ok(Arc::new(composite))
    }
}
