//! Error types for the recognition layer.

use std::time::Duration;
use thiserror::Error;

/// Result type for recognition operations.
pub type RecognitionResult<T> = Result<T, RecognitionError>;

/// Errors that can occur talking to the recognition service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecognitionError {
    /// The request never got an HTTP response (no route, refused, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-2xx status.
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The image could not be re-encoded for upload.
    #[error("encode error: {0}")]
    Encode(String),

    /// An attendance acknowledgement referenced a different entry.
    #[error("acknowledgement for {received} does not match {expected}")]
    AckMismatch { expected: String, received: String },
}

impl RecognitionError {
    /// Whether the service itself was reached.
    #[must_use]
    pub fn reached_server(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Decode(_) | Self::AckMismatch { .. })
    }
}

impl From<serde_json::Error> for RecognitionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
