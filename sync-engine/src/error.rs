//! Error types for sync-engine.

use relief_sync_types::SyncError;

use crate::config::ConfigError;
use crate::radio::{PowerState, RadioError};

/// Main error type for engine operations.
///
/// Every variant except `Config` and `AlreadyRunning` is session- or
/// tick-local: the worker logs it and returns to scanning.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Adapter is off, unauthorized or otherwise unusable.
    #[error("radio unavailable: {0}")]
    RadioUnavailable(PowerState),

    /// Transport failure during discovery.
    #[error("scan error: {0}")]
    Scan(#[source] RadioError),

    /// Transport failure on an open or opening connection.
    #[error("connection error: {0}")]
    Connection(#[source] RadioError),

    /// Malformed or oversized summary/data payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] SyncError),

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A radio operation or the whole session ran out of time.
    #[error("timed out during {operation}")]
    Timeout {
        /// The operation that did not finish.
        operation: &'static str,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Synchronization was started twice.
    #[error("synchronization already running")]
    AlreadyRunning,
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row could not be turned back into a record.
    #[error("corrupt record: {reason}")]
    Corrupt {
        /// What was wrong with the row.
        reason: String,
    },

    /// The store cannot be used right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
