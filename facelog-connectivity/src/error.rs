//! Error types for the connectivity layer.

use std::time::Duration;
use thiserror::Error;

/// Result type for connectivity operations.
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

/// Errors that can occur while driving the radio.
///
/// Being offline is not an error; it is reported by `is_online()`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectivityError {
    /// The radio tool ran and reported failure.
    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// The radio tool did not finish in time.
    #[error("{command} timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// The radio tool could not be started at all.
    #[error("failed to run {command}: {message}")]
    Spawn { command: String, message: String },

    /// The radio is powered off.
    #[error("wifi radio is disabled")]
    RadioDisabled,

    /// The HTTP probe could not be built.
    #[error("probe setup failed: {0}")]
    Probe(String),

    #[error("connectivity state lock poisoned")]
    LockPoisoned,
}
