//! The connectivity manager.

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::probe::ReachabilityProbe;
use crate::radio::RadioBackend;
use facelog_types::NetworkInfo;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connectivity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Upper bound on one reachability probe, in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone)]
struct KnownNetwork {
    ssid: String,
    secret: Option<String>,
}

/// Owns the online/offline view and the radio.
pub struct ConnectivityManager {
    radio: Arc<dyn RadioBackend>,
    probe: Arc<dyn ReachabilityProbe>,
    probe_timeout: Duration,
    online: watch::Sender<bool>,
    last_known: Mutex<Option<KnownNetwork>>,
}

impl ConnectivityManager {
    pub fn new(
        radio: Arc<dyn RadioBackend>,
        probe: Arc<dyn ReachabilityProbe>,
        config: ConnectivityConfig,
    ) -> Self {
        let (online, _) = watch::channel(false);
        Self {
            radio,
            probe,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            online,
            last_known: Mutex::new(None),
        }
    }

    /// Probes reachability now.
    ///
    /// Never takes longer than the probe timeout; a probe that fails or runs
    /// out of time counts as offline.
    pub async fn is_online(&self) -> bool {
        let online = tokio::time::timeout(self.probe_timeout, self.probe.probe())
            .await
            .unwrap_or(false);

        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("Service reachable");
            } else {
                warn!("Service unreachable");
            }
        }
        online
    }

    /// Result of the most recent probe, without probing.
    #[must_use]
    pub fn last_known_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Watches online/offline transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Visible networks, the current one first, then by signal strength.
    pub async fn list_networks(&self) -> ConnectivityResult<Vec<NetworkInfo>> {
        let mut networks = self.radio.list_networks().await?;
        networks.retain(|n| !n.ssid.trim().is_empty());
        networks.sort_by(|a, b| {
            b.is_current
                .cmp(&a.is_current)
                .then(b.signal_strength.cmp(&a.signal_strength))
        });
        Ok(networks)
    }

    pub async fn current_network(&self) -> ConnectivityResult<Option<String>> {
        self.radio.current_network().await
    }

    pub async fn radio_enabled(&self) -> ConnectivityResult<bool> {
        self.radio.radio_enabled().await
    }

    /// Joins `ssid` and remembers it for [`reconnect_to_last_known`].
    /// Already being on `ssid` counts as success.
    ///
    /// [`reconnect_to_last_known`]: Self::reconnect_to_last_known
    pub async fn connect(&self, ssid: &str, secret: Option<&str>) -> ConnectivityResult<()> {
        if self.radio.current_network().await?.as_deref() == Some(ssid) {
            debug!(ssid, "Already connected");
        } else {
            self.radio.connect(ssid, secret).await?;
        }
        self.remember_network(ssid, secret)?;
        Ok(())
    }

    /// Drops the current association. Already disconnected counts as
    /// success.
    pub async fn disconnect(&self) -> ConnectivityResult<()> {
        if self.radio.current_network().await?.is_none() {
            debug!("Already disconnected");
            return Ok(());
        }
        self.radio.disconnect().await
    }

    /// Powers the radio on or off. Already in that state counts as success.
    pub async fn set_radio_enabled(&self, enabled: bool) -> ConnectivityResult<()> {
        if self.radio.radio_enabled().await? == enabled {
            debug!(enabled, "Radio already in requested state");
            return Ok(());
        }
        self.radio.set_radio_enabled(enabled).await
    }

    /// Records a network to fall back to, e.g. one from configuration.
    pub fn remember_network(&self, ssid: &str, secret: Option<&str>) -> ConnectivityResult<()> {
        let mut last = self
            .last_known
            .lock()
            .map_err(|_| ConnectivityError::LockPoisoned)?;
        *last = Some(KnownNetwork {
            ssid: ssid.to_string(),
            secret: secret.map(str::to_string),
        });
        Ok(())
    }

    /// SSID of the remembered network.
    pub fn last_known_network(&self) -> Option<String> {
        self.last_known
            .lock()
            .ok()
            .and_then(|last| last.as_ref().map(|n| n.ssid.clone()))
    }

    /// Tries to rejoin the remembered network.
    ///
    /// Best-effort: failures are logged and reported as `false`, never
    /// propagated.
    pub async fn reconnect_to_last_known(&self) -> bool {
        let known = match self.last_known.lock() {
            Ok(last) => last.clone(),
            Err(_) => {
                warn!("Known network unavailable: lock poisoned");
                return false;
            }
        };
        let Some(known) = known else {
            debug!("No known network to reconnect to");
            return false;
        };

        if let Err(e) = self.set_radio_enabled(true).await {
            warn!(error = %e, "Could not enable radio for reconnect");
            return false;
        }
        match self.connect(&known.ssid, known.secret.as_deref()).await {
            Ok(()) => {
                info!(ssid = %known.ssid, "Reconnected to last known network");
                true
            }
            Err(e) => {
                warn!(ssid = %known.ssid, error = %e, "Reconnect failed");
                false
            }
        }
    }
}
