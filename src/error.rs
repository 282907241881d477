//! Error types for the capture pipeline
//!
//! None of these ever reach the request that triggered a capture. They are
//! produced inside background tasks and sinks, logged, counted and dropped.

use thiserror::Error;

/// Main error type for capture and delivery operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Queue destination is not configured
    #[error("Missing configuration: queue URL not provided")]
    MissingConfig,

    /// Network-related errors (connection, DNS, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Queue endpoint answered with a non-success status code
    #[error("Queue request failed: HTTP {0}")]
    SendFailed(reqwest::StatusCode),

    /// JSON serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Queue backend rejected the request with its own error code
    #[error("Queue backend error {code}: {message}")]
    Backend { code: String, message: String },

    /// One or more batch chunks could not be sent at all
    #[error("{failed} of {total} batch chunks failed to send: {reason}")]
    BatchFailed {
        failed: usize,
        total: usize,
        reason: String,
    },

    /// Dispatch queue is at capacity, task was dropped
    #[error("Capture queue is full")]
    QueueFull,

    /// Orchestrator no longer accepts work
    #[error("Capture pipeline is shut down")]
    ShutDown,

    /// Generic error for unexpected failures
    #[error("Unexpected error: {0}")]
    Other(String),
}

impl CaptureError {
    /// Create a generic error from any message
    pub fn from_string(msg: impl Into<String>) -> Self {
        CaptureError::Other(msg.into())
    }
}
