//! The orchestrator.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{CycleOutcome, CycleRecord, DrainReport, PipelineEvent};
use chrono::{DateTime, Utc};
use facelog_cache::CacheHandle;
use facelog_capture::{CaptureController, CaptureState};
use facelog_connectivity::ConnectivityManager;
use facelog_recognition::{RecognitionClient, RecognitionMetadata, RecognitionReport};
use facelog_types::{CachedUser, CapturedImage, EventType, LogEntry, RecognitionOutcome};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Snapshot for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStatus {
    pub capture: CaptureState,
    /// Result of the last reachability probe.
    pub online: bool,
    pub unsynced: usize,
    pub users_refreshed_at: Option<DateTime<Utc>>,
}

/// Drives capture cycles and the sync of their records.
pub struct Orchestrator {
    capture: Arc<CaptureController>,
    recognition: Arc<RecognitionClient>,
    cache: CacheHandle,
    connectivity: Arc<ConnectivityManager>,
    config: PipelineConfig,
    events: broadcast::Sender<PipelineEvent>,
    /// One recognition request in flight at a time.
    recognizing: Mutex<()>,
    /// One drain at a time.
    draining: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        capture: Arc<CaptureController>,
        recognition: Arc<RecognitionClient>,
        cache: CacheHandle,
        connectivity: Arc<ConnectivityManager>,
        config: PipelineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            capture,
            recognition,
            cache,
            connectivity,
            config,
            events,
            recognizing: Mutex::new(()),
            draining: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn capture(&self) -> &Arc<CaptureController> {
        &self.capture
    }

    pub fn recognition(&self) -> &Arc<RecognitionClient> {
        &self.recognition
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityManager> {
        &self.connectivity
    }

    /// Subscribes to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Capture cycles ───────────────────────────────────────────

    /// Starts a capture cycle on the runtime.
    ///
    /// The cycle runs to completion and records its entry even if the
    /// returned handle is dropped.
    pub fn trigger(self: &Arc<Self>, event_type: EventType) -> JoinHandle<PipelineResult<CycleRecord>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_cycle(event_type).await })
    }

    /// Runs one capture cycle: capture, recognize, record.
    ///
    /// Every call appends exactly one log entry, whatever failed along the
    /// way. The [`PipelineEvent::CycleRecorded`] notification goes out only
    /// once that entry is durable. The only error is a storage failure, in
    /// which case nothing was recorded.
    pub async fn run_cycle(&self, event_type: EventType) -> PipelineResult<CycleRecord> {
        let (entry, outcome) = match self.capture.capture(self.config.capture_timeout()).await {
            Ok(image) => {
                let report = self.recognize(image).await;
                let outcome = CycleOutcome::from(&report.outcome);
                let entry = LogEntry::from_outcome(event_type, &report.outcome, report.encoded_image);
                (entry, outcome)
            }
            Err(e) => {
                warn!(%event_type, error = %e, "Capture failed");
                let reason = e.to_string();
                let entry = LogEntry::capture_failed(event_type, reason.clone());
                (entry, CycleOutcome::CameraFault { reason })
            }
        };

        let record = CycleRecord {
            entry_id: entry.id,
            event_type,
            outcome,
            recorded_at: entry.created_at,
        };

        if let Err(e) = self.cache.append_log(entry).await {
            error!(entry_id = %record.entry_id, error = %e, "Attendance not recorded");
            self.publish(PipelineEvent::OperationalFault {
                reason: format!("attendance not recorded: {e}"),
            });
            return Err(e.into());
        }

        info!(
            entry_id = %record.entry_id,
            %event_type,
            outcome = %record.outcome,
            "Cycle recorded"
        );
        self.publish(PipelineEvent::CycleRecorded(record.clone()));
        Ok(record)
    }

    async fn recognize(&self, image: CapturedImage) -> RecognitionReport {
        let _turn = self.recognizing.lock().await;
        let timeout = self.config.recognition_timeout();
        let request = self
            .recognition
            .recognize(image, RecognitionMetadata::default());

        match tokio::time::timeout(timeout, request).await {
            Ok(report) => report,
            Err(_) => {
                warn!(?timeout, "Recognition did not answer in time");
                RecognitionReport {
                    outcome: RecognitionOutcome::RequestFailed {
                        reason: format!("no answer within {timeout:?}"),
                    },
                    encoded_image: None,
                }
            }
        }
    }

    /// Captures a frame and registers it under `name`.
    ///
    /// Enrollment is not an attendance event and leaves no log entry. The
    /// cached user list is refreshed afterwards, best-effort.
    pub async fn enroll(&self, name: &str, role: &str) -> PipelineResult<String> {
        let image = self.capture.capture(self.config.capture_timeout()).await?;
        let subject_id = self.recognition.enroll(image, name, role).await?;
        if let Err(e) = self.refresh_users().await {
            warn!(error = %e, "User list not refreshed after enrollment");
        }
        Ok(subject_id)
    }

    // ── Sync ─────────────────────────────────────────────────────

    /// Submits unsynced entries oldest-first.
    ///
    /// An entry is marked synced only after the service acknowledged its id.
    /// The drain stops at the first failed submission; the rest wait for the
    /// next one. Once the queue is empty, synced entries past retention are
    /// pruned. Submission failures are reported in the [`DrainReport`];
    /// only storage failures are errors.
    pub async fn drain(&self) -> PipelineResult<DrainReport> {
        let _sweep = self.draining.lock().await;

        let result = self.drain_queue().await;
        match &result {
            Ok(report) => self.publish(PipelineEvent::SyncCompleted(report.clone())),
            Err(e) => {
                error!(error = %e, "Sync aborted");
                self.publish(PipelineEvent::OperationalFault {
                    reason: format!("sync aborted: {e}"),
                });
            }
        }
        result
    }

    async fn drain_queue(&self) -> PipelineResult<DrainReport> {
        let batch_size = self.config.sync_batch_size.max(1);
        let mut report = DrainReport::default();

        'drain: loop {
            let batch = self.cache.unsynced_logs_limited(batch_size).await?;
            let last_batch = batch.len() < batch_size;

            for entry in batch {
                report.attempted += 1;
                match self.recognition.submit_attendance(&entry).await {
                    Ok(ack) => {
                        self.cache.mark_synced(entry.id).await?;
                        report.synced += 1;
                        if ack.duplicate {
                            report.duplicates += 1;
                        }
                        debug!(entry_id = %entry.id, "Entry synced");
                    }
                    Err(e) => {
                        warn!(entry_id = %entry.id, error = %e, "Sync stopped");
                        report.failure = Some(e.to_string());
                        break 'drain;
                    }
                }
            }

            if last_batch {
                break;
            }
        }

        if report.is_complete() {
            report.pruned = self.cache.prune_synced(self.config.retention()).await?;
        }
        report.remaining = self.cache.unsynced_count().await?;

        if report.attempted > 0 {
            info!(
                synced = report.synced,
                remaining = report.remaining,
                pruned = report.pruned,
                "Sync finished"
            );
        }
        Ok(report)
    }

    // ── Users ────────────────────────────────────────────────────

    /// Replaces the cached user list with the service's active users.
    ///
    /// With `fetch_thumbnails`, enrollment images are downloaded too; a
    /// missing or failed thumbnail does not fail the refresh.
    pub async fn refresh_users(&self) -> PipelineResult<usize> {
        let remote = self.recognition.fetch_users().await?;
        let refreshed_at = Utc::now();

        let mut users = Vec::with_capacity(remote.len());
        for user in remote.into_iter().filter(|u| u.active) {
            let thumbnail = if self.config.fetch_thumbnails {
                match self.recognition.fetch_user_image(&user.id).await {
                    Ok(thumbnail) => thumbnail,
                    Err(e) => {
                        debug!(user_id = %user.id, error = %e, "Thumbnail unavailable");
                        None
                    }
                }
            } else {
                None
            };
            users.push(CachedUser {
                id: user.id,
                display_name: user.name,
                role: user.role.unwrap_or_default(),
                thumbnail,
                last_refreshed_at: refreshed_at,
            });
        }

        let count = users.len();
        self.cache.replace_users(users).await?;
        info!(count, "User list refreshed");
        self.publish(PipelineEvent::UsersRefreshed { count });
        Ok(count)
    }

    // ── Status ───────────────────────────────────────────────────

    /// Current state without probing the network.
    pub async fn status(&self) -> PipelineResult<PipelineStatus> {
        Ok(PipelineStatus {
            capture: self.capture.state(),
            online: self.connectivity.last_known_online(),
            unsynced: self.cache.unsynced_count().await?,
            users_refreshed_at: self.cache.users_refreshed_at().await?,
        })
    }

    /// Awaits a spawned cycle, folding task failures into the error type.
    pub async fn join_cycle(
        handle: JoinHandle<PipelineResult<CycleRecord>>,
    ) -> PipelineResult<CycleRecord> {
        handle
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }
}
