//! Background sync scheduling.

use crate::backoff::SyncBackoff;
use crate::orchestrator::Orchestrator;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Controls a running sync loop. Dropping it stops the loop.
pub struct OrchestratorHandle {
    shutdown: watch::Sender<bool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Asks for a sweep now instead of at the next scheduled time.
    pub fn request_sync(&self) {
        self.wake.notify_one();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop and waits for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync loop ended abnormally");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Offline,
    Drained,
    Failed,
}

impl Orchestrator {
    /// Starts the background sync loop.
    ///
    /// A sweep runs immediately, then every `sync_interval_secs`, and
    /// whenever connectivity goes from offline to online. While offline the
    /// service is re-probed every `connectivity_poll_secs`, independent of
    /// the sweep schedule. Failed sweeps stretch the interval exponentially
    /// up to `max_backoff_secs`.
    pub fn spawn_sync_loop(self: &Arc<Self>) -> OrchestratorHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(run(Arc::clone(self), shutdown_rx, Arc::clone(&wake)));
        OrchestratorHandle {
            shutdown,
            wake,
            task,
        }
    }
}

async fn run(orchestrator: Arc<Orchestrator>, mut shutdown: watch::Receiver<bool>, wake: Arc<Notify>) {
    let config = orchestrator.config().clone();
    let mut backoff = SyncBackoff::new(config.sync_interval(), config.max_backoff());
    let connectivity = Arc::clone(orchestrator.connectivity());
    let mut online = connectivity.subscribe();
    let mut next_sweep = Instant::now();
    let poll_every = config.connectivity_poll();
    let mut poll = tokio::time::interval_at(Instant::now() + poll_every, poll_every);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?config.sync_interval(), "Sync loop started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = tokio::time::sleep_until(next_sweep) => {}
            _ = wake.notified() => debug!("Sync requested"),
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                if !*online.borrow_and_update() {
                    continue;
                }
                info!("Service reachable again, syncing");
            }
            _ = poll.tick(), if !connectivity.last_known_online() => {
                if !connectivity.is_online().await {
                    continue;
                }
                info!("Service reachable again, syncing");
            }
        }

        match sweep(&orchestrator).await {
            Sweep::Drained => backoff.reset(),
            Sweep::Failed => {
                let delay = backoff.record_failure();
                warn!(failures = backoff.failures(), ?delay, "Sync failed, backing off");
            }
            Sweep::Offline => {}
        }
        // Probes made by the sweep itself are not transitions to react to.
        online.borrow_and_update();
        next_sweep = Instant::now() + backoff.delay();
    }

    info!("Sync loop stopped");
}

async fn sweep(orchestrator: &Orchestrator) -> Sweep {
    let connectivity = orchestrator.connectivity();

    if !connectivity.is_online().await {
        let rejoined =
            orchestrator.config().auto_reconnect && connectivity.reconnect_to_last_known().await;
        if !rejoined || !connectivity.is_online().await {
            debug!("Offline, sync deferred");
            return Sweep::Offline;
        }
    }

    let result = match orchestrator.drain().await {
        Ok(report) if report.is_complete() => Sweep::Drained,
        Ok(_) => Sweep::Failed,
        Err(e) => {
            error!(error = %e, "Sync sweep failed");
            Sweep::Failed
        }
    };

    if result == Sweep::Drained {
        refresh_users_if_stale(orchestrator).await;
    }
    result
}

async fn refresh_users_if_stale(orchestrator: &Orchestrator) {
    let Some(max_age) = orchestrator.config().user_refresh() else {
        return;
    };
    let stale = match orchestrator.cache().users_refreshed_at().await {
        Ok(Some(at)) => Utc::now()
            .signed_duration_since(at)
            .to_std()
            .is_ok_and(|age| age >= max_age),
        Ok(None) => true,
        Err(e) => {
            warn!(error = %e, "Could not read user refresh time");
            return;
        }
    };
    if stale {
        if let Err(e) = orchestrator.refresh_users().await {
            warn!(error = %e, "User list refresh failed");
        }
    }
}
