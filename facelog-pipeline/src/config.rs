//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and policy knobs for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Overall budget for one capture, in milliseconds.
    pub capture_timeout_ms: u64,
    /// Upper bound on waiting for one recognition answer, in milliseconds.
    pub recognition_timeout_ms: u64,
    /// Time between sync sweeps while things are healthy (seconds).
    pub sync_interval_secs: u64,
    /// Upper bound for the sync delay after repeated failures (seconds).
    pub max_backoff_secs: u64,
    /// How often reachability is re-probed while offline (seconds, at least 1).
    pub connectivity_poll_secs: u64,
    /// Entries read from the cache per drain batch.
    pub sync_batch_size: usize,
    /// How long synced entries are kept locally (seconds).
    pub retention_secs: u64,
    /// Rejoin the last known WiFi network while offline.
    pub auto_reconnect: bool,
    /// Download enrollment thumbnails when refreshing users.
    pub fetch_thumbnails: bool,
    /// Refresh the cached user list when older than this (seconds, 0 = never).
    pub user_refresh_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_timeout_ms: 5_000,
            recognition_timeout_ms: 15_000,
            sync_interval_secs: 30,
            max_backoff_secs: 300,
            connectivity_poll_secs: 5,
            sync_batch_size: 50,
            retention_secs: 7 * 24 * 60 * 60,
            auto_reconnect: true,
            fetch_thumbnails: false,
            user_refresh_secs: 60 * 60,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    #[must_use]
    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    #[must_use]
    pub fn connectivity_poll(&self) -> Duration {
        Duration::from_secs(self.connectivity_poll_secs.max(1))
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// `None` when periodic user refresh is disabled.
    #[must_use]
    pub fn user_refresh(&self) -> Option<Duration> {
        (self.user_refresh_secs > 0).then(|| Duration::from_secs(self.user_refresh_secs))
    }
}
