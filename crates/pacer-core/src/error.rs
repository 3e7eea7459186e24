//! Error types for pacer-core.

use thiserror::Error;

/// Result type for pacer-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pacer-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IPC communication error with worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Worker process could not be located or started.
    #[error("worker error: {0}")]
    Worker(String),

    /// Requested cadence is not a positive, finite value.
    #[error("invalid cadence: {0}")]
    InvalidCadence(String),

    /// A collaborator could not serve a capability call.
    #[error("capability unavailable: {0}")]
    Capability(String),

    /// Execution error.
    #[error("execution error: {0}")]
    Execution(String),

    /// Execution was aborted because the session is stopping.
    #[error("execution aborted")]
    Aborted,
}
