//! Item registration, pending listing and status updates.

use crate::error::DatabaseError;
use crate::types::{Item, ItemId, ItemStatus, NewItem};
use crate::{Error, Result};

use super::{Database, ItemRow};

const ITEM_COLUMNS: &str = r#"
    id, source_locator, destination_key, status, transfer_duration_seconds,
    size_bytes, mime_type, modified_at, storage_tier, created_at, updated_at
"#;

impl Database {
    /// Register an item with status `pending`
    ///
    /// Re-registering an existing id overwrites its catalog fields and resets it to
    /// `pending`; `created_at` keeps its original value.
    pub async fn put_initial(&self, item: &NewItem) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO items (
                id, source_locator, destination_key, status, transfer_duration_seconds,
                size_bytes, mime_type, modified_at, storage_tier, created_at, updated_at
            ) VALUES (?, ?, ?, 'pending', NULL, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_locator = excluded.source_locator,
                destination_key = excluded.destination_key,
                status = 'pending',
                transfer_duration_seconds = NULL,
                size_bytes = excluded.size_bytes,
                mime_type = excluded.mime_type,
                modified_at = excluded.modified_at,
                storage_tier = excluded.storage_tier,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.id.as_str())
        .bind(&item.source_locator)
        .bind(&item.destination_key)
        .bind(item.size_bytes)
        .bind(&item.mime_type)
        .bind(&item.modified_at)
        .bind(&item.storage_tier)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert item {}: {}",
                item.id, e
            )))
        })?;

        Ok(())
    }

    /// Get an item by ID
    pub async fn get_item(&self, id: &ItemId) -> Result<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get item: {}",
                e
            )))
        })?;

        row.map(Item::try_from).transpose().map_err(Error::from)
    }

    /// List items with a specific status, in registration order
    pub async fn list_items_by_status(&self, status: ItemStatus) -> Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE status = ? ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list {} items: {}",
                status, e
            )))
        })?;

        rows.into_iter()
            .map(|row| Item::try_from(row).map_err(Error::from))
            .collect()
    }

    /// List items waiting for a transfer
    pub async fn list_pending(&self) -> Result<Vec<Item>> {
        self.list_items_by_status(ItemStatus::Pending).await
    }

    /// Overwrite an item's status and last transfer duration
    ///
    /// Writing the same status twice is harmless: the row is overwritten, never appended.
    pub async fn update_status(
        &self,
        id: &ItemId,
        status: ItemStatus,
        duration_seconds: Option<f64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE items
            SET status = ?,
                transfer_duration_seconds = COALESCE(?, transfer_duration_seconds),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(duration_seconds)
        .bind(now)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update status of {}: {}",
                id, e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "item {}",
                id
            ))));
        }

        Ok(())
    }

    /// Count items with a specific status
    pub async fn count_by_status(&self, status: ItemStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count {} items: {}",
                    status, e
                )))
            })?;

        Ok(count.max(0) as u64)
    }
}
