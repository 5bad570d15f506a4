//! Transfer primitive: move one item's bytes from the source to the destination
//!
//! Implementations never fail loudly. Every network, HTTP status or filesystem problem is
//! logged and reported as `false`, which the orchestrator turns into retry bookkeeping.
//!
//! - [`HttpTransfer`] streams the source URL into a temp file and uploads it to an
//!   [`ObjectStore`](object_store::ObjectStore)
//! - [`RcloneTransfer`] shells out to `rclone copyto` between two remotes

use async_trait::async_trait;
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, TransferMethod};
use crate::types::Item;

mod destination;
mod http;
mod rclone;

pub use destination::build_object_store;
pub use http::HttpTransfer;
pub use rclone::RcloneTransfer;

/// Moves the bytes of a single item
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Copy `item` from its source locator to its destination key
    ///
    /// `work_dir` is where temporary files may be created; implementations must leave
    /// nothing behind in it, whatever the outcome.
    async fn transfer(&self, item: &Item, work_dir: &Path) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Build the transfer primitive selected by `config.transfer.method`
pub fn build_transfer(
    config: Arc<Config>,
    destination: Arc<dyn ObjectStore>,
) -> crate::Result<Arc<dyn Transfer>> {
    match config.transfer.method {
        TransferMethod::Http => Ok(Arc::new(HttpTransfer::new(config, destination)?)),
        TransferMethod::Rclone => Ok(Arc::new(RcloneTransfer::from_config(&config)?)),
    }
}
