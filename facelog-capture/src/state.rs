//! Capture controller state machine.

use std::fmt;

/// Where the camera is in its lifecycle.
///
/// ```text
/// Closed → Opening → Ready → Capturing → Ready
///                      ↑         ↓
///                      └─ Failed ┘        (transient)
/// Opening → Failed { permanent: true }    (no hardware)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Closed,
    Opening,
    Ready,
    Capturing,
    /// A permanent failure stays until `close()`; a transient one moves
    /// straight back to `Ready`.
    Failed { permanent: bool },
}

impl CaptureState {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    #[must_use]
    pub fn is_permanently_failed(&self) -> bool {
        matches!(self, Self::Failed { permanent: true })
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Opening => f.write_str("opening"),
            Self::Ready => f.write_str("ready"),
            Self::Capturing => f.write_str("capturing"),
            Self::Failed { permanent: true } => f.write_str("failed (permanent)"),
            Self::Failed { permanent: false } => f.write_str("failed"),
        }
    }
}
