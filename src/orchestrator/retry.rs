//! Per-item attempt counters for one run.

use std::collections::HashMap;

use crate::types::ItemId;

/// Failed attempts per item, bounded by the retry limit
///
/// An item may be attempted while `attempts <= retry_limit`, so it gets at most
/// `retry_limit + 1` attempts in total.
#[derive(Debug)]
pub(crate) struct RetryState {
    retry_limit: u32,
    attempts: HashMap<ItemId, u32>,
}

impl RetryState {
    pub(crate) fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            attempts: HashMap::new(),
        }
    }

    /// Count a failed attempt and return the new total
    pub(crate) fn record_failure(&mut self, id: &ItemId) -> u32 {
        let attempts = self.attempts.entry(id.clone()).or_insert(0);
        *attempts = attempts.saturating_add(1);
        *attempts
    }

    pub(crate) fn attempts(&self, id: &ItemId) -> u32 {
        self.attempts.get(id).copied().unwrap_or(0)
    }

    /// Whether another attempt is allowed
    pub(crate) fn can_retry(&self, id: &ItemId) -> bool {
        self.attempts(id) <= self.retry_limit
    }

    pub(crate) fn is_exhausted(&self, id: &ItemId) -> bool {
        !self.can_retry(id)
    }
}
