//! Error types for video-migrate
//!
//! Only initialization problems (configuration, an unreachable item store, a held run
//! lease) ever surface to the caller of a transfer job. Per-item failures are folded into
//! the [`JobResult`](crate::types::JobResult) and side-channel failures (notifications,
//! failure-log uploads) are logged and swallowed by the orchestrator.

use thiserror::Error;

/// Result type alias for video-migrate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for video-migrate
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.retry_limit")
        key: Option<String>,
    },

    /// Item store operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Destination object store error
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The job could not start: pending items could not be enumerated, the store is
    /// unreachable, or another run holds the lease
    #[error("job initialization failed: {0}")]
    JobInitialization(String),

    /// A notification channel rejected or failed to deliver a message
    #[error("notification failed: {0}")]
    Notification(String),

    /// External tool execution failed (rclone)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, disabled feature)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Machine-readable error code, used as a structured logging field
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(DatabaseError::NotFound(_)) => "not_found",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::ObjectStore(_) => "object_store_error",
            Error::Serialization(_) => "serialization_error",
            Error::JobInitialization(_) => "job_initialization_error",
            Error::Notification(_) => "notification_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error prevented a job from starting at all
    pub fn is_initialization(&self) -> bool {
        matches!(self, Error::JobInitialization(_) | Error::Config { .. })
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded into its typed form
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}
