//! What the pipeline tells the outside world.

use chrono::{DateTime, Utc};
use facelog_types::{EventType, LogEntryId, RecognitionOutcome};
use std::fmt;

/// User-facing classification of one capture cycle.
///
/// Explicit mismatches and failed recognition requests look the same to the
/// person at the checkpoint; only the log entry keeps the difference.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Recognized { name: String },
    NotRecognized,
    CameraFault { reason: String },
}

impl CycleOutcome {
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Recognized { .. })
    }
}

impl From<&RecognitionOutcome> for CycleOutcome {
    fn from(outcome: &RecognitionOutcome) -> Self {
        match outcome {
            RecognitionOutcome::Matched { subject_name, .. } => Self::Recognized {
                name: subject_name.clone(),
            },
            RecognitionOutcome::NotMatched | RecognitionOutcome::RequestFailed { .. } => {
                Self::NotRecognized
            }
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recognized { name } => write!(f, "recognized: {name}"),
            Self::NotRecognized => f.write_str("not recognized"),
            Self::CameraFault { reason } => write!(f, "camera error: {reason}"),
        }
    }
}

/// A cycle that has been durably recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    pub entry_id: LogEntryId,
    pub event_type: EventType,
    pub outcome: CycleOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Result of one drain of the unsynced queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Entries submitted, including the one that failed.
    pub attempted: usize,
    /// Entries acknowledged and marked synced.
    pub synced: usize,
    /// Acknowledgements flagged as already known by the service.
    pub duplicates: usize,
    /// Synced entries removed after the queue emptied.
    pub pruned: usize,
    /// Entries still waiting.
    pub remaining: usize,
    /// Why the drain stopped early.
    pub failure: Option<String>,
}

impl DrainReport {
    /// Whether every unsynced entry was acknowledged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Broadcast by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A cycle's log entry is on disk.
    CycleRecorded(CycleRecord),
    /// Storage failed; the operator must see this.
    OperationalFault { reason: String },
    /// A drain finished, fully or not.
    SyncCompleted(DrainReport),
    /// The cached user list was replaced.
    UsersRefreshed { count: usize },
}
