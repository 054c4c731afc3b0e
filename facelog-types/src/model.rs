//! The checkpoint data model.
//!
//! A capture cycle produces a [`CapturedImage`], which is exchanged for a
//! [`RecognitionOutcome`], which is always turned into exactly one
//! [`LogEntry`]. [`CachedUser`] and [`NetworkInfo`] are read-side
//! projections used for display and manual reconnection.

use crate::{CaptureId, LogEntryId, ParseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display name recorded for attempts that did not identify anyone.
pub const UNKNOWN_SUBJECT: &str = "Unknown";

/// An encoded frame produced by one successful capture.
///
/// The buffer is handed over by value; once passed to the recognition
/// client it is not reused.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Vec<u8>,
    captured_at: DateTime<Utc>,
    capture_id: CaptureId,
}

impl CapturedImage {
    /// Wraps freshly captured bytes, stamping them with the current time.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            captured_at: Utc::now(),
            capture_id: CaptureId::new(),
        }
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the image, returning its buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    #[must_use]
    pub fn capture_id(&self) -> CaptureId {
        self.capture_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("capture_id", &self.capture_id)
            .field("captured_at", &self.captured_at)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Result of asking the recognition service about one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    /// The service identified a registered subject.
    Matched {
        subject_id: String,
        subject_name: String,
        distance: f64,
    },
    /// The service answered, but nobody matched.
    NotMatched,
    /// No usable answer: transport failure, timeout, non-2xx or bad body.
    RequestFailed { reason: String },
}

impl RecognitionOutcome {
    #[must_use]
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    /// The matched subject's name, if any.
    #[must_use]
    pub fn subject_name(&self) -> Option<&str> {
        match self {
            Self::Matched { subject_name, .. } => Some(subject_name),
            _ => None,
        }
    }

    /// Log status this outcome is recorded with.
    #[must_use]
    pub fn status(&self) -> LogStatus {
        if self.is_matched() {
            LogStatus::Success
        } else {
            LogStatus::Failed
        }
    }
}

/// Direction of an attendance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    CheckIn,
    CheckOut,
}

impl EventType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CheckIn => "check-in",
            Self::CheckOut => "check-out",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check-in" | "checkin" | "in" => Ok(Self::CheckIn),
            "check-out" | "checkout" | "out" => Ok(Self::CheckOut),
            other => Err(ParseError {
                kind: "event type",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether a capture cycle identified someone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
}

impl LogStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(ParseError {
                kind: "log status",
                value: other.to_string(),
            }),
        }
    }
}

/// Durable record of one capture cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Locally generated, time-ordered identifier. Doubles as the server
    /// idempotency key.
    pub id: LogEntryId,
    /// Matched subject's name, or [`UNKNOWN_SUBJECT`].
    pub subject_name: String,
    /// Matched subject's server-side id.
    pub subject_id: Option<String>,
    pub event_type: EventType,
    pub status: LogStatus,
    /// Match distance reported by the service.
    pub distance: Option<f64>,
    /// Why the cycle failed, when it did.
    pub failure_reason: Option<String>,
    /// Encoded image of the attempt, if one was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub synced: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    /// Creates an unsynced entry with a fresh id.
    #[must_use]
    pub fn new(event_type: EventType, subject_name: impl Into<String>, status: LogStatus) -> Self {
        Self {
            id: LogEntryId::new(),
            subject_name: subject_name.into(),
            subject_id: None,
            event_type,
            status,
            distance: None,
            failure_reason: None,
            captured_image: None,
            created_at: Utc::now(),
            synced: false,
            synced_at: None,
        }
    }

    /// Builds the entry for a cycle that reached the recognition service.
    #[must_use]
    pub fn from_outcome(
        event_type: EventType,
        outcome: &RecognitionOutcome,
        captured_image: Option<Vec<u8>>,
    ) -> Self {
        let mut entry = match outcome {
            RecognitionOutcome::Matched {
                subject_id,
                subject_name,
                distance,
            } => {
                let mut entry = Self::new(event_type, subject_name.clone(), LogStatus::Success);
                entry.subject_id = Some(subject_id.clone());
                entry.distance = Some(*distance);
                entry
            }
            RecognitionOutcome::NotMatched => {
                let mut entry = Self::new(event_type, UNKNOWN_SUBJECT, LogStatus::Failed);
                entry.failure_reason = Some("not matched".to_string());
                entry
            }
            RecognitionOutcome::RequestFailed { reason } => {
                let mut entry = Self::new(event_type, UNKNOWN_SUBJECT, LogStatus::Failed);
                entry.failure_reason = Some(reason.clone());
                entry
            }
        };
        entry.captured_image = captured_image;
        entry
    }

    /// Builds the entry for a cycle whose capture never produced an image.
    #[must_use]
    pub fn capture_failed(event_type: EventType, reason: impl Into<String>) -> Self {
        let mut entry = Self::new(event_type, UNKNOWN_SUBJECT, LogStatus::Failed);
        entry.failure_reason = Some(reason.into());
        entry
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LogStatus::Success
    }
}

/// A registered user as last seen on the server, kept for offline display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedUser {
    pub id: String,
    pub display_name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<u8>>,
    pub last_refreshed_at: DateTime<Utc>,
}

/// A visible wireless network. Recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ssid: String,
    /// Signal quality, 0 to 100.
    pub signal_strength: u8,
    pub secured: bool,
    pub is_current: bool,
}

impl NetworkInfo {
    /// Creates a network description, clamping the signal to 0..=100.
    #[must_use]
    pub fn new(ssid: impl Into<String>, signal_strength: u32, secured: bool, is_current: bool) -> Self {
        Self {
            ssid: ssid.into(),
            signal_strength: signal_strength.min(100) as u8,
            secured,
            is_current,
        }
    }
}
