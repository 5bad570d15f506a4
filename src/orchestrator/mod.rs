//! Transfer orchestration
//!
//! One run turns the store's `pending` items into `completed` or `failed` outcomes:
//!
//! 1. take the run lease and reset the failure log
//! 2. list pending items once
//! 3. **pass 1**: attempt every item (optionally several at once)
//! 4. **pass 2**: retry the items that failed in pass 1, one at a time, until each either
//!    succeeds or has used `retry_limit + 1` attempts
//! 5. read back the store's completed count and announce the verdict
//! 6. give the lease back
//!
//! The lease is renewed in the background for as long as the run lasts.
//!
//! Progress thresholds, per-item notifications and failure-log appends are all issued by
//! the single coordinator loop, so they are observed in a consistent order whatever the
//! transfer concurrency.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::failure_log::{FailureLog, FailureLogEntry, FailureOutcome, FileFailureLog};
use crate::notify::{Notifier, build_notifier};
use crate::store::ItemStore;
use crate::transfer::{Transfer, build_object_store, build_transfer};
use crate::types::{CompletionStatus, Event, Item, ItemId, ItemStatus, JobResult};

mod progress;
mod retry;

use progress::JobProgress;
use retry::RetryState;

/// Floor on the lease renewal period
const LEASE_RENEW_MIN_PERIOD: Duration = Duration::from_millis(100);

/// Collaborators of a transfer run
///
/// Built once and handed to [`TransferOrchestrator::new`]. Every collaborator is a trait
/// object so embedders and tests can substitute their own.
#[derive(Clone)]
pub struct Dependencies {
    /// Per-item tracking records
    pub store: Arc<dyn ItemStore>,
    /// Moves one item's bytes
    pub transfer: Arc<dyn Transfer>,
    /// Progress, failure and completion signals
    pub notifier: Arc<dyn Notifier>,
    /// Durable record of failed attempts
    pub failure_log: Arc<dyn FailureLog>,
    /// Retry, concurrency and threshold settings
    pub config: Arc<Config>,
}

impl Dependencies {
    /// Build the production collaborators described by `config`
    ///
    /// Events are also published on `event_tx` when given. An unreachable item store is an
    /// initialization error.
    pub async fn from_config(
        config: Config,
        event_tx: Option<broadcast::Sender<Event>>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let db = Database::new(&config.persistence.database_path)
            .await
            .map_err(|e| {
                Error::JobInitialization(format!(
                    "item store at {} is unavailable: {}",
                    config.persistence.database_path.display(),
                    e
                ))
            })?;

        let destination = build_object_store(&config.destination.backend)?;
        let transfer = build_transfer(Arc::clone(&config), Arc::clone(&destination))?;
        let notifier = build_notifier(&config.notifications, event_tx)?;
        let failure_log = FileFailureLog::from_config(&config.failure_log, destination)?;

        Ok(Self {
            store: Arc::new(db),
            transfer,
            notifier,
            failure_log: Arc::new(failure_log),
            config,
        })
    }
}

/// A notification the coordinator wants to send
#[derive(Debug)]
enum Signal {
    Progress(u8),
    ItemFailed(ItemId),
    ItemCompleted(ItemId),
    JobCompleted(CompletionStatus),
}

/// Result of one transfer attempt
enum Attempt {
    Transferred(Item, Duration),
    Failed(Item, Duration),
    /// Cancelled before the transfer started
    Skipped(Item),
}

/// Mutable state of one run, owned by the coordinator
struct RunState {
    notify: bool,
    progress: JobProgress,
    retries: RetryState,
    /// Items that failed in pass 1 with budget left, in failure order
    retry_queue: Vec<Item>,
    failed: Vec<ItemId>,
    not_attempted: Vec<ItemId>,
}

/// Drives a transfer run over the store's pending items
pub struct TransferOrchestrator {
    deps: Dependencies,
}

impl TransferOrchestrator {
    /// Create an orchestrator over `deps`
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    /// Build production collaborators from `config` and wrap them
    pub async fn from_config(
        config: Config,
        event_tx: Option<broadcast::Sender<Event>>,
    ) -> Result<Self> {
        Ok(Self::new(Dependencies::from_config(config, event_tx).await?))
    }

    /// Collaborators in use
    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    /// Transfer every pending item
    ///
    /// Only initialization problems are errors: the lease is held by another run, or the
    /// pending items cannot be listed. Per-item failures are reported in the [`JobResult`].
    pub async fn run(&self, enable_notifications: bool) -> Result<JobResult> {
        self.run_with_cancel(enable_notifications, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires
    ///
    /// After cancellation no new transfer starts; transfers already running finish and are
    /// recorded. Items never attempted stay `pending` and are listed in
    /// [`JobResult::not_attempted`].
    pub async fn run_with_cancel(
        &self,
        enable_notifications: bool,
        cancel: CancellationToken,
    ) -> Result<JobResult> {
        let owner = format!("run-{}-{:016x}", std::process::id(), rand::random::<u64>());
        let ttl = self.deps.config.persistence.run_lock_ttl;

        match self.deps.store.acquire_run_lock(&owner, ttl).await {
            Ok(true) => {
                tracing::debug!(owner = %owner, "run lease acquired");
            }
            Ok(false) => {
                tracing::error!("another transfer run holds the lease");
                return Err(Error::JobInitialization(
                    "another transfer run is in progress".into(),
                ));
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to acquire run lease");
                return Err(Error::JobInitialization(format!(
                    "could not acquire run lease: {}",
                    e
                )));
            }
        }

        // The heartbeat cancels the run if the lease is ever lost
        let run_cancel = cancel.child_token();
        let heartbeat_stop = CancellationToken::new();
        let heartbeat = self.spawn_lease_heartbeat(
            owner.clone(),
            ttl,
            heartbeat_stop.clone(),
            run_cancel.clone(),
        );

        let result = self.execute(enable_notifications, &run_cancel).await;

        heartbeat_stop.cancel();
        if let Err(e) = heartbeat.await {
            tracing::warn!(owner = %owner, error = %e, "lease heartbeat task panicked");
        }

        if let Err(e) = self.deps.store.release_run_lock(&owner).await {
            tracing::warn!(owner = %owner, error = %e, "failed to release run lease");
        }

        result
    }

    /// Renew the run lease every third of its TTL until `stop` fires
    ///
    /// Losing the lease to another owner cancels `run`: no new transfer starts and the
    /// result reports the run as cancelled.
    fn spawn_lease_heartbeat(
        &self,
        owner: String,
        ttl: Duration,
        stop: CancellationToken,
        run: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.deps.store);
        let period = (ttl / 3).max(LEASE_RENEW_MIN_PERIOD);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; the lease was just taken
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {}
                }

                match store.acquire_run_lock(&owner, ttl).await {
                    Ok(true) => tracing::trace!(owner = %owner, "run lease renewed"),
                    Ok(false) => {
                        tracing::error!(owner = %owner, "run lease taken by another run, stopping");
                        run.cancel();
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(owner = %owner, error = %e, "failed to renew run lease");
                    }
                }
            }
        })
    }

    /// Completed items in the store, or None when the count cannot be read
    async fn completed_in_store(&self) -> Option<u64> {
        match self.deps.store.count_by_status(ItemStatus::Completed).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(error = %e, "failed to count completed items");
                None
            }
        }
    }

    async fn execute(&self, notify: bool, cancel: &CancellationToken) -> Result<JobResult> {
        if let Err(e) = self.deps.failure_log.reset().await {
            tracing::warn!(error = %e, "failed to reset failure log");
        }

        let completed_before = self.completed_in_store().await;

        let items = self.deps.store.list_pending().await.map_err(|e| {
            tracing::error!(error = %e, "failed to list pending items");
            Error::JobInitialization(format!("could not list pending items: {}", e))
        })?;

        let total_items = items.len();
        tracing::info!(
            total_items,
            transfer = self.deps.transfer.name(),
            "transfer job started"
        );

        if total_items == 0 {
            self.signal(notify, Signal::JobCompleted(CompletionStatus::Success))
                .await;
            return Ok(JobResult {
                all_succeeded: true,
                store_completed: completed_before,
                ..Default::default()
            });
        }

        let mut state = RunState {
            notify,
            progress: JobProgress::new(total_items, self.deps.config.notifications.progress_step),
            retries: RetryState::new(self.deps.config.retry.retry_limit),
            retry_queue: Vec::new(),
            failed: Vec::new(),
            not_attempted: Vec::new(),
        };

        self.signal(notify, Signal::Progress(0)).await;

        self.first_pass(&mut state, items, cancel).await;
        self.retry_pass(&mut state, cancel).await;

        let all_succeeded = state.failed.is_empty() && state.not_attempted.is_empty();
        let status = if all_succeeded {
            CompletionStatus::Success
        } else {
            CompletionStatus::FailedAfterRetries
        };
        self.signal(notify, Signal::JobCompleted(status)).await;

        let completed_items = state.progress.completed_items();
        let store_completed = self.completed_in_store().await;
        if let (Some(before), Some(after)) = (completed_before, store_completed) {
            let expected = before + completed_items as u64;
            if after != expected {
                tracing::warn!(
                    expected,
                    recorded = after,
                    "item store disagrees with the run about completed items"
                );
            }
        }

        let result = JobResult {
            all_succeeded,
            failed_item_ids: state.failed,
            total_items,
            completed_items,
            not_attempted: state.not_attempted,
            cancelled: cancel.is_cancelled(),
            store_completed,
        };

        tracing::info!(
            total_items,
            completed = result.completed_items,
            failed = result.failed_item_ids.len(),
            not_attempted = result.not_attempted.len(),
            cancelled = result.cancelled,
            store_completed = ?result.store_completed,
            "transfer job finished with status: {}",
            status
        );

        Ok(result)
    }

    /// Attempt every item once, up to `max_concurrent_transfers` at a time
    async fn first_pass(&self, state: &mut RunState, items: Vec<Item>, cancel: &CancellationToken) {
        let config = &self.deps.config.transfer;
        let concurrency = config.max_concurrent_transfers.max(1);
        let item_delay = config.item_delay;
        let work_dir = config.work_dir.clone();

        // `then` releases items one by one, so the delay spaces out transfer starts
        let attempts = stream::iter(items.into_iter().enumerate())
            .then(|(index, item)| {
                let cancel = cancel.clone();
                async move {
                    if index > 0 && !item_delay.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(item_delay) => {}
                            _ = cancel.cancelled() => {}
                        }
                    }
                    item
                }
            })
            .map(|item| self.spawn_attempt(item, work_dir.clone(), cancel.clone()))
            .buffer_unordered(concurrency);
        let mut attempts = std::pin::pin!(attempts);

        while let Some(attempt) = attempts.next().await {
            match attempt {
                Attempt::Transferred(item, elapsed) => {
                    self.on_success(state, &item, elapsed).await;
                }
                Attempt::Failed(item, elapsed) => {
                    let outcome = self.on_failure(state, &item, elapsed, "pass 1").await;
                    match outcome {
                        FailureOutcome::Failed => state.retry_queue.push(item),
                        FailureOutcome::RetriesExhausted => state.failed.push(item.id),
                    }
                }
                Attempt::Skipped(item) => {
                    tracing::debug!(item_id = %item.id, "not attempted, run cancelled");
                    state.not_attempted.push(item.id);
                }
            }
        }
    }

    /// Retry pass-1 failures one at a time until each succeeds or runs out of attempts
    async fn retry_pass(&self, state: &mut RunState, cancel: &CancellationToken) {
        let retry_delay = self.deps.config.retry.retry_delay;
        let work_dir = self.deps.config.transfer.work_dir.clone();
        let queue = std::mem::take(&mut state.retry_queue);

        for item in queue {
            let mut transferred = false;

            while state.retries.can_retry(&item.id) && !cancel.is_cancelled() {
                tokio::select! {
                    _ = tokio::time::sleep(retry_delay) => {}
                    _ = cancel.cancelled() => break,
                }

                tracing::info!(
                    item_id = %item.id,
                    attempt = state.retries.attempts(&item.id) + 1,
                    "retrying transfer"
                );

                let started = Instant::now();
                let ok = self.deps.transfer.transfer(&item, &work_dir).await;
                let elapsed = started.elapsed();

                if ok {
                    self.on_success(state, &item, elapsed).await;
                    transferred = true;
                    break;
                }
                self.on_failure(state, &item, elapsed, "pass 2").await;
            }

            if !transferred {
                state.failed.push(item.id);
            }
        }
    }

    async fn spawn_attempt(&self, item: Item, work_dir: PathBuf, cancel: CancellationToken) -> Attempt {
        if cancel.is_cancelled() {
            return Attempt::Skipped(item);
        }

        let transfer = Arc::clone(&self.deps.transfer);
        let task_item = item.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let ok = transfer.transfer(&task_item, &work_dir).await;
            (ok, started.elapsed())
        });

        match task.await {
            Ok((true, elapsed)) => Attempt::Transferred(item, elapsed),
            Ok((false, elapsed)) => Attempt::Failed(item, elapsed),
            Err(e) => {
                tracing::error!(item_id = %item.id, error = %e, "transfer task panicked");
                Attempt::Failed(item, Duration::ZERO)
            }
        }
    }

    async fn on_success(&self, state: &mut RunState, item: &Item, elapsed: Duration) {
        tracing::info!(
            item_id = %item.id,
            duration_secs = elapsed.as_secs_f64(),
            "item transferred"
        );

        self.update_store(&item.id, ItemStatus::Completed, elapsed)
            .await;
        self.signal(state.notify, Signal::ItemCompleted(item.id.clone()))
            .await;

        for percent in state.progress.record_completion() {
            self.signal(state.notify, Signal::Progress(percent)).await;
        }
    }

    /// Record a failed attempt and say whether the item may be retried
    async fn on_failure(
        &self,
        state: &mut RunState,
        item: &Item,
        elapsed: Duration,
        pass: &str,
    ) -> FailureOutcome {
        self.update_store(&item.id, ItemStatus::Failed, elapsed)
            .await;

        let attempts = state.retries.record_failure(&item.id);
        let outcome = if state.retries.is_exhausted(&item.id) {
            FailureOutcome::RetriesExhausted
        } else {
            FailureOutcome::Failed
        };

        tracing::warn!(
            item_id = %item.id,
            attempts,
            exhausted = outcome == FailureOutcome::RetriesExhausted,
            "item transfer failed"
        );

        self.signal(state.notify, Signal::ItemFailed(item.id.clone()))
            .await;

        let entry = FailureLogEntry {
            item_id: item.id.clone(),
            outcome,
            duration: elapsed,
            message: format!("{}, attempt {}", pass, attempts),
        };
        if let Err(e) = self.deps.failure_log.append(&entry).await {
            tracing::warn!(item_id = %item.id, error = %e, "failed to append to failure log");
        } else if let Err(e) = self.deps.failure_log.flush().await {
            tracing::warn!(item_id = %item.id, error = %e, "failed to persist failure log");
        }

        outcome
    }

    async fn update_store(&self, id: &ItemId, status: ItemStatus, elapsed: Duration) {
        if let Err(e) = self
            .deps
            .store
            .update_status(id, status, Some(elapsed.as_secs_f64()))
            .await
        {
            tracing::warn!(item_id = %id, status = %status, error = %e, "failed to update item status");
        }
    }

    async fn signal(&self, enabled: bool, signal: Signal) {
        if !enabled {
            tracing::debug!(?signal, "notification skipped");
            return;
        }

        let notifier = &self.deps.notifier;
        let result = match &signal {
            Signal::Progress(percent) => notifier.progress(*percent).await,
            Signal::ItemFailed(id) => notifier.item_failed(id).await,
            Signal::ItemCompleted(id) => notifier.item_completed(id).await,
            Signal::JobCompleted(status) => notifier.job_completed(*status).await,
        };

        if let Err(e) = result {
            tracing::warn!(?signal, error = %e, "notification failed");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
