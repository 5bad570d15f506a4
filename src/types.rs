//! Core types for video-migrate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of an item (the catalog path of the source object)
#[derive(
    Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<&str> for ItemId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transfer status of an item
///
/// Stored as the literal strings `"pending"`, `"completed"` and `"failed"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Registered by ingestion, waiting for a transfer
    Pending,
    /// Bytes are at the destination
    Completed,
    /// The last attempt failed
    Failed,
}

impl ItemStatus {
    /// Wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "completed" => Ok(ItemStatus::Completed),
            "failed" => Ok(ItemStatus::Failed),
            other => Err(format!("unknown item status '{other}'")),
        }
    }
}

/// One media object tracked through the transfer pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Primary key (catalog path)
    pub id: ItemId,
    /// Where the transfer primitive finds the source bytes (URL or remote path)
    pub source_locator: String,
    /// Target key at the destination store
    pub destination_key: String,
    /// Current transfer status
    pub status: ItemStatus,
    /// Duration of the last terminal transfer attempt
    pub transfer_duration_seconds: Option<f64>,
    /// Size of the source object in bytes, when the catalog reported it
    pub size_bytes: Option<i64>,
    /// MIME type reported by the catalog
    pub mime_type: Option<String>,
    /// Source modification time as reported by the catalog
    pub modified_at: Option<String>,
    /// Source storage tier (e.g. "STANDARD")
    pub storage_tier: Option<String>,
    /// Unix timestamp when the item was registered
    pub created_at: i64,
    /// Unix timestamp of the last status change
    pub updated_at: i64,
}

/// Item to be registered in the store with status `pending`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    /// Primary key (catalog path)
    pub id: ItemId,
    /// Where the transfer primitive finds the source bytes
    pub source_locator: String,
    /// Target key at the destination store
    pub destination_key: String,
    /// Size of the source object in bytes
    pub size_bytes: Option<i64>,
    /// MIME type reported by the catalog
    pub mime_type: Option<String>,
    /// Source modification time
    pub modified_at: Option<String>,
    /// Source storage tier
    pub storage_tier: Option<String>,
}

/// Final verdict announced by the completion notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    /// Every pending item reached the destination
    Success,
    /// At least one item exhausted its retries or was never attempted
    FailedAfterRetries,
}

impl CompletionStatus {
    /// Human-readable form used in notification payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Success => "Success",
            CompletionStatus::FailedAfterRetries => "Failed after retries",
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one transfer job run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// True when every pending item was transferred
    pub all_succeeded: bool,
    /// Attempted items that did not reach the destination: retries exhausted, or retries
    /// cut short by cancellation. In the order they gave up.
    pub failed_item_ids: Vec<ItemId>,
    /// Number of pending items at job start
    pub total_items: usize,
    /// Number of items transferred during this run
    pub completed_items: usize,
    /// Items never attempted because the run was cancelled (still pending in the store)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_attempted: Vec<ItemId>,
    /// Whether the run stopped early on a cancellation request
    #[serde(default)]
    pub cancelled: bool,
    /// Items the store reports as completed after the run, across every run so far.
    /// None when the store could not be read back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_completed: Option<u64>,
}

/// Events broadcast to in-process subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A progress threshold was crossed
    Progress {
        /// Percentage of pending items transferred (multiple of the threshold step)
        percent: u8,
    },

    /// An item reached the destination
    ItemCompleted {
        /// Item that was transferred
        id: ItemId,
    },

    /// A transfer attempt failed
    ItemFailed {
        /// Item that failed
        id: ItemId,
    },

    /// The job finished
    JobCompleted {
        /// Final verdict
        status: CompletionStatus,
    },
}
