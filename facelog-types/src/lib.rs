//! Core type definitions for the FaceLog checkpoint.
//!
//! This crate defines the types shared by every pipeline component:
//! - Log entry and capture identifiers (UUID v7, time-ordered)
//! - Captured images and recognition outcomes
//! - Attendance log entries, cached users and network descriptions
//!
//! Nothing in here performs I/O.

mod ids;
mod model;

pub use ids::{CaptureId, LogEntryId};
pub use model::{
    CachedUser, CapturedImage, EventType, LogEntry, LogStatus, NetworkInfo, RecognitionOutcome,
    UNKNOWN_SUBJECT,
};

/// A string did not name any variant of a wire enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}
