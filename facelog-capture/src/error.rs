//! Error types for the capture layer.

use std::time::Duration;
use thiserror::Error;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors that can occur while opening or using the camera.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// No camera hardware was found, or it refused to start.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// No frame arrived before the deadline.
    #[error("capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    /// Another capture is already in flight.
    #[error("capture already in progress")]
    CaptureBusy,

    /// The device reported an error while grabbing a frame.
    #[error("capture failed: {0}")]
    Failed(String),
}
