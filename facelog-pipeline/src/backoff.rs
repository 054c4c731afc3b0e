//! Sync retry delay.

use std::time::Duration;

/// Exponential backoff between sync sweeps.
///
/// Starts at the base interval, doubles after every failed sweep and is
/// capped at `max`. A successful sweep resets it.
#[derive(Debug, Clone)]
pub struct SyncBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl SyncBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Delay before the next sweep.
    #[must_use]
    pub fn delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Records a failed sweep and returns the new delay.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1).min(31);
        self.delay()
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
