//! Common error types for the Angel synchronization engine

use thiserror::Error;

/// Common result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the synchronization engine
///
/// Ingestion errors are the only failures surfaced to callers; sync and
/// persistence failures are recovered internally (batch requeue, skipped
/// snapshot cycle) and observable via logs and events.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed raw producer input; not retried, returned to the caller
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Batch-group fusion failure; the drained batch is requeued
    #[error("Sync error: {0}")]
    Sync(String),

    /// Snapshot write or restore failure; never fatal
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
