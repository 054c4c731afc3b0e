//! Error types for the pipeline.

use facelog_cache::StorageError;
use facelog_capture::CaptureError;
use facelog_connectivity::ConnectivityError;
use facelog_recognition::RecognitionError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced to the operator.
///
/// Capture and recognition failures inside a cycle do not show up here; they
/// are recorded in the cycle's log entry instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The local cache failed. The event may not have been recorded.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Camera error outside a capture cycle (e.g. enrollment).
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Recognition service error outside a capture cycle.
    #[error("recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    /// Radio or reachability error.
    #[error("connectivity error: {0}")]
    Connectivity(#[from] ConnectivityError),

    /// A spawned cycle panicked or was cancelled.
    #[error("cycle task failed: {0}")]
    Task(String),
}
