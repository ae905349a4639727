//! Error types for entwine operations.

use thiserror::Error;

/// Result type alias for entwine operations.
pub type Result<T> = std::result::Result<T, EntwineError>;

/// Errors that can occur during a blocking run.
#[derive(Error, Debug)]
pub enum EntwineError {
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration, detected before any worker starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker task failed. The run is aborted and partial state discarded.
    #[error("worker failed on partition {partition}: {message}")]
    Worker {
        /// Index of the task that failed.
        partition: usize,
        /// Failure description from the worker.
        message: String,
    },

    /// A merge step received a payload of an incompatible shape.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Shape the merge step expected.
        expected: String,
        /// Shape it actually received.
        found: String,
    },

    /// Malformed input data.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A requested file or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}
