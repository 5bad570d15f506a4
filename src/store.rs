//! Item store adapter
//!
//! The orchestrator talks to the metadata store only through [`ItemStore`], so tests can
//! substitute stores that fail on demand. [`Database`] is the production implementation.

use async_trait::async_trait;
use std::time::Duration;

use crate::db::Database;
use crate::types::{Item, ItemId, ItemStatus, NewItem};

/// Durable per-item tracking records
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Items with status `pending`, in the store's order
    async fn list_pending(&self) -> crate::Result<Vec<Item>>;

    /// Register an item with status `pending`
    async fn put_initial(&self, item: &NewItem) -> crate::Result<()>;

    /// Overwrite an item's status and last transfer duration
    async fn update_status(
        &self,
        id: &ItemId,
        status: ItemStatus,
        duration_seconds: Option<f64>,
    ) -> crate::Result<()>;

    /// Number of items currently in `status`
    async fn count_by_status(&self, status: ItemStatus) -> crate::Result<u64>;

    /// Take the run lease; false when another run holds it
    async fn acquire_run_lock(&self, owner: &str, ttl: Duration) -> crate::Result<bool>;

    /// Give the run lease back
    async fn release_run_lock(&self, owner: &str) -> crate::Result<()>;
}

#[async_trait]
impl ItemStore for Database {
    async fn list_pending(&self) -> crate::Result<Vec<Item>> {
        Database::list_pending(self).await
    }

    async fn put_initial(&self, item: &NewItem) -> crate::Result<()> {
        Database::put_initial(self, item).await
    }

    async fn update_status(
        &self,
        id: &ItemId,
        status: ItemStatus,
        duration_seconds: Option<f64>,
    ) -> crate::Result<()> {
        Database::update_status(self, id, status, duration_seconds).await
    }

    async fn count_by_status(&self, status: ItemStatus) -> crate::Result<u64> {
        Database::count_by_status(self, status).await
    }

    async fn acquire_run_lock(&self, owner: &str, ttl: Duration) -> crate::Result<bool> {
        Database::acquire_run_lock(self, owner, ttl).await
    }

    async fn release_run_lock(&self, owner: &str) -> crate::Result<()> {
        Database::release_run_lock(self, owner).await
    }
}
