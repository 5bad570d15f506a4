//! Database layer for video-migrate
//!
//! SQLite persistence for item tracking records and the run lease.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`items`]: Item registration, pending listing, status updates
//! - [`state`]: Run lease preventing concurrent jobs against one store

use crate::error::DatabaseError;
use crate::types::{Item, ItemId, ItemStatus};
use sqlx::{FromRow, sqlite::SqlitePool};

mod items;
mod migrations;
mod state;

/// Item record as stored in the `items` table
///
/// This is the only place where the storage representation (status as text, optional
/// columns as NULL) meets the typed [`Item`]; conversion happens in `TryFrom<ItemRow>`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ItemRow {
    pub(crate) id: String,
    pub(crate) source_locator: String,
    pub(crate) destination_key: String,
    pub(crate) status: String,
    pub(crate) transfer_duration_seconds: Option<f64>,
    pub(crate) size_bytes: Option<i64>,
    pub(crate) mime_type: Option<String>,
    pub(crate) modified_at: Option<String>,
    pub(crate) storage_tier: Option<String>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl TryFrom<ItemRow> for Item {
    type Error = DatabaseError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let status: ItemStatus = row
            .status
            .parse()
            .map_err(|e| DatabaseError::InvalidData(format!("item {}: {}", row.id, e)))?;

        Ok(Item {
            id: ItemId(row.id),
            source_locator: row.source_locator,
            destination_key: row.destination_key,
            status,
            transfer_duration_seconds: row.transfer_duration_seconds,
            size_bytes: row.size_bytes,
            mime_type: row.mime_type,
            modified_at: row.modified_at,
            storage_tier: row.storage_tier,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database handle for video-migrate
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
