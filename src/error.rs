//! Error types for the marigraph crate.
//!
//! All fallible operations return `Result<T, MarigraphError>` rather than
//! panicking, providing meaningful diagnostics for calibration failures,
//! malformed wire frames, worker-lifecycle faults, and invalid inputs.

use thiserror::Error;

/// Convenience type alias for results in this crate.
pub type Result<T> = std::result::Result<T, MarigraphError>;

/// Errors that can occur across the surface analytics, renderer, IPC layer,
/// and worker supervisor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MarigraphError {
    /// Input data is invalid (e.g., non-monotone axis, mismatched grid sizes).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Numerical computation failed (e.g., NaN, ill-conditioned matrix).
    #[error("numerical error: {message}")]
    NumericalError { message: String },

    /// Smile calibration failed to converge.
    #[error("calibration failed: {message}")]
    CalibrationError {
        message: String,
        /// Final RMS error at the point of failure, if available.
        rms_error: Option<f64>,
    },

    /// Malformed or oversize wire frame.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Template or wiring configuration is invalid.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A worker process failed (spawn, handshake, or unexpected exit).
    #[error("worker '{id}' failed: {message}")]
    Worker { id: String, message: String },

    /// An operation exceeded its deadline.
    #[error("timed out after {millis}ms: {message}")]
    Timeout { message: String, millis: u64 },

    /// I/O error on a pipe, socket, or file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MarigraphError {
    /// Shorthand for a [`MarigraphError::Protocol`] with the given message.
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        MarigraphError::Protocol {
            message: message.into(),
        }
    }

    /// Shorthand for a [`MarigraphError::Config`] with the given message.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        MarigraphError::Config {
            message: message.into(),
        }
    }
}
