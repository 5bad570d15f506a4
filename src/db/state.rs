//! Run lease: at most one transfer job may work against a store at a time.

use crate::error::DatabaseError;
use crate::{Error, Result};
use std::time::Duration;

use super::Database;

impl Database {
    /// Try to take the run lease for `owner`
    ///
    /// Returns false when another owner holds a lease that has not expired yet.
    /// The current owner may call this again to extend its lease. Times are unix
    /// milliseconds.
    pub async fn acquire_run_lock(&self, owner: &str, ttl: Duration) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64);

        let result = sqlx::query(
            r#"
            INSERT INTO run_lock (id, owner, acquired_at, expires_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE run_lock.expires_at <= ? OR run_lock.owner = excluded.owner
            "#,
        )
        .bind(owner)
        .bind(now)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to acquire run lock: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Release the run lease if `owner` still holds it
    pub async fn release_run_lock(&self, owner: &str) -> Result<()> {
        sqlx::query("DELETE FROM run_lock WHERE owner = ?")
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to release run lock: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Current lease holder, if any lease (expired or not) is recorded
    pub async fn run_lock_owner(&self) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT owner FROM run_lock WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read run lock: {}",
                    e
                )))
            })
    }
}
