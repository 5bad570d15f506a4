//! Assertions shared by integration tests

use std::path::Path;
use tokio::sync::broadcast;
use video_migrate::{Database, Event, ItemId, ItemStatus};

/// Everything already published on `events`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Progress percentages in the order they were published
pub fn progress_percents(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Progress { percent } => Some(*percent),
            _ => None,
        })
        .collect()
}

/// Assert the stored status of `id`
pub async fn assert_item_status(db: &Database, id: &str, expected: ItemStatus) {
    let item = db
        .get_item(&ItemId::new(id))
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("item {} not found", id));
    assert_eq!(item.status, expected, "unexpected status for {}", id);
}

/// Assert that `dir` exists and contains nothing
pub fn assert_dir_empty(dir: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", dir.display(), e))
        .collect();
    assert!(
        leftovers.is_empty(),
        "expected {} to be empty, found {} entries",
        dir.display(),
        leftovers.len()
    );
}
