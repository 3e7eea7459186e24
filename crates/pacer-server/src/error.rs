//! Error types for the Pacer server.

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pacer core error.
    #[error("Core error: {0}")]
    Core(#[from] pacer_core::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A cadence message carried a value that is not a frequency.
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    /// Bind address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The coordinator task is gone.
    #[error("Session coordinator stopped")]
    CoordinatorClosed,

    /// A blocking coordinator step panicked.
    #[error("Coordinator task failed: {0}")]
    Task(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
