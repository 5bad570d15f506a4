use super::*;
use crate::failure_log::MemoryFailureLog;
use crate::types::NewItem;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// In-memory item store with switchable failures
#[derive(Default)]
struct MemoryStore {
    items: Mutex<Vec<Item>>,
    lease: Mutex<Option<String>>,
    fail_listing: bool,
    fail_updates: bool,
    updates: Mutex<Vec<(ItemId, ItemStatus)>>,
}

impl MemoryStore {
    fn with_items(ids: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut items = store.items.lock().unwrap();
            for id in ids {
                items.push(pending(id));
            }
        }
        store
    }

    fn status_of(&self, id: &str) -> Option<ItemStatus> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.status)
    }
}

fn pending(id: &str) -> Item {
    Item {
        id: ItemId::new(id),
        source_locator: format!("https://source.example/{id}"),
        destination_key: id.to_string(),
        status: ItemStatus::Pending,
        transfer_duration_seconds: None,
        size_bytes: None,
        mime_type: None,
        modified_at: None,
        storage_tier: None,
        created_at: 0,
        updated_at: 0,
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn list_pending(&self) -> Result<Vec<Item>> {
        if self.fail_listing {
            return Err(Error::Other("store unreachable".into()));
        }
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.status == ItemStatus::Pending)
            .cloned()
            .collect())
    }

    async fn put_initial(&self, item: &NewItem) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        items.retain(|i| i.id != item.id);
        items.push(pending(item.id.as_str()));
        Ok(())
    }

    async fn update_status(
        &self,
        id: &ItemId,
        status: ItemStatus,
        duration_seconds: Option<f64>,
    ) -> Result<()> {
        self.updates.lock().unwrap().push((id.clone(), status));
        if self.fail_updates {
            return Err(Error::Other("write rejected".into()));
        }
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| Error::Other(format!("unknown item {id}")))?;
        item.status = status;
        item.transfer_duration_seconds = duration_seconds;
        Ok(())
    }

    async fn count_by_status(&self, status: ItemStatus) -> Result<u64> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.status == status)
            .count() as u64)
    }

    async fn acquire_run_lock(&self, owner: &str, _ttl: Duration) -> Result<bool> {
        let mut lease = self.lease.lock().unwrap();
        match lease.as_deref() {
            Some(current) if current != owner => Ok(false),
            _ => {
                *lease = Some(owner.to_string());
                Ok(true)
            }
        }
    }

    async fn release_run_lock(&self, owner: &str) -> Result<()> {
        let mut lease = self.lease.lock().unwrap();
        if lease.as_deref() == Some(owner) {
            *lease = None;
        }
        Ok(())
    }
}

/// Transfer whose outcomes are scripted per item
///
/// Each call pops the next scripted outcome for the item; once the script is empty the
/// default outcome is used.
struct ScriptedTransfer {
    scripts: Mutex<HashMap<ItemId, VecDeque<bool>>>,
    default_outcome: bool,
    calls: Mutex<Vec<ItemId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    /// Cancel this token once this many calls have started
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedTransfer {
    fn always(outcome: bool) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_outcome: outcome,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            cancel_after: None,
        }
    }

    fn script(self, id: &str, outcomes: &[bool]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(ItemId::new(id), outcomes.iter().copied().collect());
        self
    }

    fn calls_for(&self, id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == id)
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transfer for ScriptedTransfer {
    async fn transfer(&self, item: &Item, _work_dir: &Path) -> bool {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(item.id.clone());
            calls.len()
        };
        if let Some((after, token)) = &self.cancel_after
            && call_number >= *after
        {
            token.cancel();
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.scripts
            .lock()
            .unwrap()
            .get_mut(&item.id)
            .and_then(|script| script.pop_front())
            .unwrap_or(self.default_outcome)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Notifier that records every signal as an [`Event`]
#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
    fail: bool,
}

impl RecordingNotifier {
    fn record(&self, event: Event) -> Result<()> {
        self.events.lock().unwrap().push(event);
        if self.fail {
            return Err(Error::Notification("channel down".into()));
        }
        Ok(())
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn thresholds(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress { percent } => Some(percent),
                _ => None,
            })
            .collect()
    }

    fn completions(&self) -> Vec<CompletionStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::JobCompleted { status } => Some(status),
                _ => None,
            })
            .collect()
    }

    fn failures_for(&self, id: &str) -> usize {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::ItemFailed { id: failed } if *failed == id))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn progress(&self, percent: u8) -> Result<()> {
        self.record(Event::Progress { percent })
    }

    async fn item_failed(&self, id: &ItemId) -> Result<()> {
        self.record(Event::ItemFailed { id: id.clone() })
    }

    async fn item_completed(&self, id: &ItemId) -> Result<()> {
        self.record(Event::ItemCompleted { id: id.clone() })
    }

    async fn job_completed(&self, status: CompletionStatus) -> Result<()> {
        self.record(Event::JobCompleted { status })
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    transfer: Arc<ScriptedTransfer>,
    notifier: Arc<RecordingNotifier>,
    log: Arc<MemoryFailureLog>,
    orchestrator: TransferOrchestrator,
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.transfer.item_delay = Duration::ZERO;
    config.retry.retry_delay = Duration::ZERO;
    config.retry.retry_limit = 5;
    config
}

fn harness(store: MemoryStore, transfer: ScriptedTransfer, config: Config) -> Harness {
    harness_with(store, transfer, RecordingNotifier::default(), config)
}

fn harness_with(
    store: MemoryStore,
    transfer: ScriptedTransfer,
    notifier: RecordingNotifier,
    config: Config,
) -> Harness {
    let store = Arc::new(store);
    let transfer = Arc::new(transfer);
    let notifier = Arc::new(notifier);
    let log = Arc::new(MemoryFailureLog::new());

    let orchestrator = TransferOrchestrator::new(Dependencies {
        store: store.clone(),
        transfer: transfer.clone(),
        notifier: notifier.clone(),
        failure_log: log.clone(),
        config: Arc::new(config),
    });

    Harness {
        store,
        transfer,
        notifier,
        log,
        orchestrator,
    }
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("video-{i:02}.mp4")).collect()
}

fn store_of(n: usize) -> MemoryStore {
    let ids = ids(n);
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    MemoryStore::with_items(&refs)
}

const ALL_THRESHOLDS: [u8; 11] = [0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

// ---------------------------------------------------------------------------
// Happy path and progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_items_succeeding_reports_every_threshold_once() {
    let h = harness(store_of(10), ScriptedTransfer::always(true), fast_config());

    let result = h.orchestrator.run(true).await.unwrap();

    assert!(result.all_succeeded);
    assert!(result.failed_item_ids.is_empty());
    assert_eq!(result.total_items, 10);
    assert_eq!(result.completed_items, 10);
    assert!(!result.cancelled);
    assert_eq!(h.notifier.thresholds(), ALL_THRESHOLDS);
    assert_eq!(h.notifier.completions(), vec![CompletionStatus::Success]);
    assert_eq!(h.store.count_by_status(ItemStatus::Completed).await.unwrap(), 10);
    assert!(h.log.lines().is_empty());
}

#[tokio::test]
async fn seven_items_emit_each_threshold_exactly_once() {
    let h = harness(store_of(7), ScriptedTransfer::always(true), fast_config());

    h.orchestrator.run(true).await.unwrap();

    assert_eq!(h.notifier.thresholds(), ALL_THRESHOLDS);
}

#[tokio::test]
async fn successes_are_announced_per_item() {
    let h = harness(store_of(2), ScriptedTransfer::always(true), fast_config());

    h.orchestrator.run(true).await.unwrap();

    let completed: Vec<Event> = h
        .notifier
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::ItemCompleted { .. }))
        .collect();
    assert_eq!(completed.len(), 2);
}

#[tokio::test]
async fn zero_items_complete_immediately() {
    let h = harness(
        MemoryStore::default(),
        ScriptedTransfer::always(true),
        fast_config(),
    );

    let result = h.orchestrator.run(true).await.unwrap();

    assert!(result.all_succeeded);
    assert_eq!(result.total_items, 0);
    assert!(h.notifier.thresholds().is_empty());
    assert_eq!(h.notifier.completions(), vec![CompletionStatus::Success]);
    assert_eq!(h.transfer.total_calls(), 0);
}

// ---------------------------------------------------------------------------
// Retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn item_failing_five_times_then_succeeding_is_completed() {
    let transfer =
        ScriptedTransfer::always(true).script("flaky.mp4", &[false, false, false, false, false]);
    let h = harness(
        MemoryStore::with_items(&["flaky.mp4"]),
        transfer,
        fast_config(),
    );

    let result = h.orchestrator.run(true).await.unwrap();

    assert!(result.all_succeeded);
    assert_eq!(h.transfer.calls_for("flaky.mp4"), 6);
    assert_eq!(h.store.status_of("flaky.mp4"), Some(ItemStatus::Completed));
    assert_eq!(h.log.lines().len(), 5);
    assert_eq!(h.notifier.failures_for("flaky.mp4"), 5);
    assert_eq!(h.notifier.thresholds(), ALL_THRESHOLDS);
}

#[tokio::test]
async fn always_failing_item_uses_full_budget_and_is_reported_once() {
    let transfer = ScriptedTransfer::always(true).script("broken.mp4", &[false; 10]);
    let h = harness(
        MemoryStore::with_items(&["ok-1.mp4", "broken.mp4", "ok-2.mp4"]),
        transfer,
        fast_config(),
    );

    let result = h.orchestrator.run(true).await.unwrap();

    assert!(!result.all_succeeded);
    assert_eq!(result.failed_item_ids, vec![ItemId::new("broken.mp4")]);
    assert_eq!(result.completed_items, 2);
    assert_eq!(h.transfer.calls_for("broken.mp4"), 6);
    assert_eq!(h.store.status_of("broken.mp4"), Some(ItemStatus::Failed));
    assert_eq!(
        h.notifier.completions(),
        vec![CompletionStatus::FailedAfterRetries]
    );

    let lines = h.log.lines();
    assert_eq!(lines.len(), 6);
    assert!(lines[..5].iter().all(|l| !l.ends_with("(retries exhausted)")));
    assert!(lines[5].starts_with("broken.mp4 failed to transfer after "));
    assert!(lines[5].ends_with(" (retries exhausted)"));
    assert_eq!(h.log.flush_count(), 6, "log is persisted after every failure");
}

#[tokio::test]
async fn zero_retry_limit_fails_on_first_attempt() {
    let mut config = fast_config();
    config.retry.retry_limit = 0;
    let h = harness(
        MemoryStore::with_items(&["a.mp4"]),
        ScriptedTransfer::always(false),
        config,
    );

    let result = h.orchestrator.run(true).await.unwrap();

    assert_eq!(result.failed_item_ids, vec![ItemId::new("a.mp4")]);
    assert_eq!(h.transfer.calls_for("a.mp4"), 1);
    assert_eq!(h.log.lines().len(), 1);
    assert!(h.log.lines()[0].ends_with("(retries exhausted)"));
}

#[tokio::test]
async fn retries_happen_after_first_pass() {
    let transfer = ScriptedTransfer::always(true).script("a.mp4", &[false]);
    let h = harness(
        MemoryStore::with_items(&["a.mp4", "b.mp4", "c.mp4"]),
        transfer,
        fast_config(),
    );

    h.orchestrator.run(true).await.unwrap();

    let calls = h.transfer.calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["a.mp4", "b.mp4", "c.mp4", "a.mp4"]);
}

#[tokio::test]
async fn progress_counts_items_completed_on_retry() {
    let transfer = ScriptedTransfer::always(true).script("video-00.mp4", &[false, false]);
    let h = harness(store_of(10), transfer, fast_config());

    let result = h.orchestrator.run(true).await.unwrap();

    assert!(result.all_succeeded);
    assert_eq!(h.notifier.thresholds(), ALL_THRESHOLDS);
}

// ---------------------------------------------------------------------------
// Initialization failures and leases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_failure_is_initialization_error() {
    let store = MemoryStore {
        fail_listing: true,
        ..store_of(3)
    };
    let h = harness(store, ScriptedTransfer::always(true), fast_config());

    let err = h.orchestrator.run(true).await.unwrap_err();

    assert!(matches!(err, Error::JobInitialization(_)));
    assert!(err.is_initialization());
    assert_eq!(h.transfer.total_calls(), 0);
    assert!(h.notifier.events().is_empty());
    assert!(
        h.store.lease.lock().unwrap().is_none(),
        "lease is released after a failed start"
    );
}

#[tokio::test]
async fn held_lease_refuses_second_run() {
    let store = store_of(3);
    *store.lease.lock().unwrap() = Some("another-run".into());
    let h = harness(store, ScriptedTransfer::always(true), fast_config());

    let err = h.orchestrator.run(true).await.unwrap_err();

    assert!(matches!(err, Error::JobInitialization(_)));
    assert_eq!(h.transfer.total_calls(), 0);
    assert_eq!(
        h.store.lease.lock().unwrap().as_deref(),
        Some("another-run")
    );
}

#[tokio::test]
async fn lease_is_released_after_run() {
    let h = harness(store_of(2), ScriptedTransfer::always(true), fast_config());

    h.orchestrator.run(true).await.unwrap();

    assert!(h.store.lease.lock().unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Best-effort side channels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_notifications_never_reach_notifier_but_log_still_written() {
    let h = harness(
        MemoryStore::with_items(&["a.mp4", "b.mp4"]),
        ScriptedTransfer::always(true).script("b.mp4", &[false]),
        fast_config(),
    );

    let result = h.orchestrator.run(false).await.unwrap();

    assert!(result.all_succeeded);
    assert!(h.notifier.events().is_empty());
    assert_eq!(h.log.lines().len(), 1);
}

#[tokio::test]
async fn failing_notifier_does_not_change_outcome() {
    let notifier = RecordingNotifier {
        fail: true,
        ..Default::default()
    };
    let h = harness_with(
        store_of(3),
        ScriptedTransfer::always(true),
        notifier,
        fast_config(),
    );

    let result = h.orchestrator.run(true).await.unwrap();

    assert!(result.all_succeeded);
    assert_eq!(h.notifier.thresholds(), ALL_THRESHOLDS);
}

#[tokio::test]
async fn store_update_failures_are_tolerated() {
    let store = MemoryStore {
        fail_updates: true,
        ..store_of(2)
    };
    let h = harness(store, ScriptedTransfer::always(true), fast_config());

    let result = h.orchestrator.run(true).await.unwrap();

    assert!(result.all_succeeded);
    assert_eq!(h.store.updates.lock().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Concurrency and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_transfers_keep_thresholds_ordered() {
    let mut config = fast_config();
    config.transfer.max_concurrent_transfers = 4;
    let transfer = ScriptedTransfer {
        delay: Duration::from_millis(20),
        ..ScriptedTransfer::always(true)
    };
    let h = harness(store_of(12), transfer, config);

    let result = h.orchestrator.run(true).await.unwrap();

    assert!(result.all_succeeded);
    assert_eq!(h.notifier.thresholds(), ALL_THRESHOLDS);
    let peak = h.transfer.max_in_flight.load(Ordering::SeqCst);
    assert!(peak > 1 && peak <= 4, "peak concurrency was {peak}");
}

#[tokio::test]
async fn sequential_by_default() {
    let transfer = ScriptedTransfer {
        delay: Duration::from_millis(5),
        ..ScriptedTransfer::always(true)
    };
    let h = harness(store_of(4), transfer, fast_config());

    h.orchestrator.run(true).await.unwrap();

    assert_eq!(h.transfer.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_leaves_remaining_items_pending() {
    let cancel = CancellationToken::new();
    let transfer = ScriptedTransfer {
        cancel_after: Some((2, cancel.clone())),
        ..ScriptedTransfer::always(true)
    };
    let h = harness(store_of(5), transfer, fast_config());

    let result = h
        .orchestrator
        .run_with_cancel(true, cancel)
        .await
        .unwrap();

    assert!(result.cancelled);
    assert!(!result.all_succeeded);
    assert_eq!(result.completed_items, 2);
    assert_eq!(
        result.not_attempted,
        vec![
            ItemId::new("video-02.mp4"),
            ItemId::new("video-03.mp4"),
            ItemId::new("video-04.mp4"),
        ]
    );
    assert_eq!(h.transfer.total_calls(), 2);
    assert_eq!(h.store.status_of("video-04.mp4"), Some(ItemStatus::Pending));
    assert_eq!(
        h.notifier.completions(),
        vec![CompletionStatus::FailedAfterRetries]
    );
}

#[tokio::test]
async fn cancellation_stops_retries() {
    let cancel = CancellationToken::new();
    let transfer = ScriptedTransfer {
        cancel_after: Some((2, cancel.clone())),
        ..ScriptedTransfer::always(false)
    };
    let h = harness(MemoryStore::with_items(&["a.mp4"]), transfer, fast_config());

    let result = h
        .orchestrator
        .run_with_cancel(true, cancel)
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.failed_item_ids, vec![ItemId::new("a.mp4")]);
    assert_eq!(h.transfer.calls_for("a.mp4"), 2);
}

#[tokio::test]
async fn item_delay_spaces_out_transfer_starts() {
    let mut config = fast_config();
    config.transfer.item_delay = Duration::from_millis(40);
    let h = harness(store_of(3), ScriptedTransfer::always(true), config);

    let started = Instant::now();
    let result = h.orchestrator.run(true).await.unwrap();

    assert!(result.all_succeeded);
    assert_eq!(h.transfer.total_calls(), 3);
    // No pause before the first item, one before each of the others
    assert!(started.elapsed() >= Duration::from_millis(80));
}

// ---------------------------------------------------------------------------
// Lease renewal and store read-back
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lease_is_renewed_while_run_outlives_its_ttl() {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let db = Arc::new(Database::new(db_file.path()).await.unwrap());
    for id in ["slow-1.mp4", "slow-2.mp4"] {
        db.put_initial(&NewItem {
            id: ItemId::new(id),
            source_locator: format!("https://source.example/{id}"),
            destination_key: id.to_string(),
            size_bytes: None,
            mime_type: None,
            modified_at: None,
            storage_tier: None,
        })
        .await
        .unwrap();
    }

    let mut config = fast_config();
    config.persistence.run_lock_ttl = Duration::from_secs(1);
    let orchestrator = Arc::new(TransferOrchestrator::new(Dependencies {
        store: db.clone(),
        transfer: Arc::new(ScriptedTransfer {
            delay: Duration::from_millis(1000),
            ..ScriptedTransfer::always(true)
        }),
        notifier: Arc::new(RecordingNotifier::default()),
        failure_log: Arc::new(MemoryFailureLog::new()),
        config: Arc::new(config),
    }));

    let first = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run(false).await }
    });

    // Past the TTL of the lease taken at start
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let second = orchestrator.run(false).await;
    assert!(
        matches!(second, Err(Error::JobInitialization(_))),
        "second run must be refused while the first is still working"
    );

    let first = first.await.unwrap().unwrap();
    assert!(first.all_succeeded);
    assert!(!first.cancelled);
    assert_eq!(first.completed_items, 2);
    assert_eq!(db.run_lock_owner().await.unwrap(), None);
}

#[tokio::test]
async fn losing_the_lease_stops_the_run() {
    let mut config = fast_config();
    config.persistence.run_lock_ttl = Duration::from_millis(300);
    let transfer = ScriptedTransfer {
        delay: Duration::from_millis(100),
        ..ScriptedTransfer::always(true)
    };
    let h = harness(store_of(10), transfer, config);

    let store = h.store.clone();
    let intruder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        *store.lease.lock().unwrap() = Some("intruder".into());
    });

    let result = h.orchestrator.run(true).await.unwrap();
    intruder.await.unwrap();

    assert!(result.cancelled);
    assert!(!result.all_succeeded);
    assert!(!result.not_attempted.is_empty());
    assert!(h.transfer.total_calls() < 10);
    assert_eq!(
        h.store.lease.lock().unwrap().as_deref(),
        Some("intruder"),
        "the new holder keeps its lease"
    );
}

#[tokio::test]
async fn completed_count_is_read_back_from_store() {
    let transfer = ScriptedTransfer::always(true).script("video-01.mp4", &[false; 10]);
    let h = harness(store_of(4), transfer, fast_config());

    let result = h.orchestrator.run(true).await.unwrap();

    assert_eq!(result.completed_items, 3);
    assert_eq!(result.store_completed, Some(3));

    // A later run over the re-queued item counts earlier completions too
    h.store
        .put_initial(&NewItem {
            id: ItemId::new("video-01.mp4"),
            source_locator: String::new(),
            destination_key: "video-01.mp4".into(),
            size_bytes: None,
            mime_type: None,
            modified_at: None,
            storage_tier: None,
        })
        .await
        .unwrap();
    h.transfer.scripts.lock().unwrap().clear();

    let again = h.orchestrator.run(true).await.unwrap();
    assert_eq!(again.completed_items, 1);
    assert_eq!(again.store_completed, Some(4));
}

#[tokio::test]
async fn store_that_lost_updates_is_visible_in_result() {
    let store = MemoryStore {
        fail_updates: true,
        ..store_of(2)
    };
    let h = harness(store, ScriptedTransfer::always(true), fast_config());

    let result = h.orchestrator.run(true).await.unwrap();

    assert_eq!(result.completed_items, 2);
    assert_eq!(result.store_completed, Some(0));
}
