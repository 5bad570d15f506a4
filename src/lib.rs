//! # video-migrate
//!
//! Resumable migration of a video library from one object store to another.
//!
//! Items are registered in a durable SQLite store as `pending`, then a transfer run moves
//! each one (download from the source, upload to the destination) and records the outcome
//! per item. Failed items are retried a bounded number of times, every failed attempt is
//! written to a failure log that is mirrored to durable storage, and progress is announced
//! at fixed percentage thresholds.
//!
//! ## Quick Start
//!
//! ```no_run
//! use video_migrate::{Config, TransferOrchestrator};
//! use video_migrate::catalog::{CatalogMapper, ingest, parse_listing};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_json_file("migrate.json".as_ref())?;
//!     let (event_tx, mut events) = tokio::sync::broadcast::channel(1000);
//!     let orchestrator = TransferOrchestrator::from_config(config, Some(event_tx)).await?;
//!
//!     // Register the source listing (output of `rclone lsjson`)
//!     let listing = parse_listing(&std::fs::read("listing.json")?)?;
//!     let mapper = CatalogMapper::new().with_source_prefix("https://cdn.example.com");
//!     ingest(orchestrator.dependencies().store.as_ref(), &mapper, &listing).await?;
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let result = orchestrator.run(true).await?;
//!     println!("all succeeded: {}", result.all_succeeded);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog ingestion
pub mod catalog;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Failure log
pub mod failure_log;
/// Notification channels
pub mod notify;
/// Transfer orchestration
pub mod orchestrator;
/// Item store abstraction
pub mod store;
/// Transfer primitives
pub mod transfer;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, StoreBackend, TransferMethod};
pub use db::Database;
pub use error::{DatabaseError, Error, Result};
pub use failure_log::{FailureLog, FailureLogEntry, FailureOutcome, FileFailureLog};
pub use notify::{ChannelNotifier, CompositeNotifier, NoOpNotifier, Notifier};
pub use orchestrator::{Dependencies, TransferOrchestrator};
pub use store::ItemStore;
pub use transfer::{HttpTransfer, RcloneTransfer, Transfer};
pub use types::{CompletionStatus, Event, Item, ItemId, ItemStatus, JobResult, NewItem};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives a termination signal.
///
/// Spawns a background task and returns immediately. Pass the same token to
/// [`TransferOrchestrator::run_with_cancel`] so a run stops starting new transfers on
/// shutdown and reports the rest as not attempted.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use video_migrate::{Config, TransferOrchestrator, cancel_on_shutdown_signal};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = TransferOrchestrator::from_config(Config::default(), None).await?;
///
///     let cancel = CancellationToken::new();
///     cancel_on_shutdown_signal(cancel.clone());
///
///     let result = orchestrator.run_with_cancel(true, cancel).await?;
///     println!("left pending: {}", result.not_attempted.len());
///     Ok(())
/// }
/// ```
pub fn cancel_on_shutdown_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::info!("cancelling transfer run");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
