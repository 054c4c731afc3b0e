//! Mock radio and probe for testing.

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::probe::ReachabilityProbe;
use crate::radio::RadioBackend;
use async_trait::async_trait;
use facelog_types::NetworkInfo;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct RadioState {
    enabled: bool,
    networks: Vec<NetworkInfo>,
    secrets: HashMap<String, String>,
    current: Option<String>,
    connects: Vec<String>,
    disconnects: usize,
    radio_toggles: usize,
}

/// An in-memory radio. Clones share state.
#[derive(Debug, Clone)]
pub struct MockRadio {
    state: Arc<Mutex<RadioState>>,
}

impl MockRadio {
    /// An enabled radio that sees no networks.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RadioState {
                enabled: true,
                ..Default::default()
            })),
        }
    }

    /// Adds a visible open network.
    pub fn add_network(&self, ssid: &str, signal: u32) {
        self.state
            .lock()
            .unwrap()
            .networks
            .push(NetworkInfo::new(ssid, signal, false, false));
    }

    /// Adds a visible network that needs `secret`.
    pub fn add_secured_network(&self, ssid: &str, signal: u32, secret: &str) {
        let mut state = self.state.lock().unwrap();
        state.networks.push(NetworkInfo::new(ssid, signal, true, false));
        state.secrets.insert(ssid.to_string(), secret.to_string());
    }

    /// Pretends the device is already associated with `ssid`.
    pub fn set_current(&self, ssid: Option<&str>) {
        self.state.lock().unwrap().current = ssid.map(str::to_string);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().enabled = enabled;
    }

    /// SSIDs passed to `connect`, in order.
    pub fn connect_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    pub fn radio_toggles(&self) -> usize {
        self.state.lock().unwrap().radio_toggles
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadioBackend for MockRadio {
    async fn list_networks(&self) -> ConnectivityResult<Vec<NetworkInfo>> {
        let state = self.state.lock().unwrap();
        if !state.enabled {
            return Ok(Vec::new());
        }
        Ok(state
            .networks
            .iter()
            .map(|n| NetworkInfo {
                is_current: state.current.as_deref() == Some(n.ssid.as_str()),
                ..n.clone()
            })
            .collect())
    }

    async fn connect(&self, ssid: &str, secret: Option<&str>) -> ConnectivityResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connects.push(ssid.to_string());
        if !state.enabled {
            return Err(ConnectivityError::RadioDisabled);
        }
        if !state.networks.iter().any(|n| n.ssid == ssid) {
            return Err(ConnectivityError::CommandFailed {
                command: "connect".into(),
                message: format!("no network with SSID '{ssid}' found"),
            });
        }
        if let Some(expected) = state.secrets.get(ssid) {
            if secret != Some(expected.as_str()) {
                return Err(ConnectivityError::CommandFailed {
                    command: "connect".into(),
                    message: "secrets were required, but not provided".into(),
                });
            }
        }
        state.current = Some(ssid.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> ConnectivityResult<()> {
        let mut state = self.state.lock().unwrap();
        state.disconnects += 1;
        state.current = None;
        Ok(())
    }

    async fn radio_enabled(&self) -> ConnectivityResult<bool> {
        Ok(self.state.lock().unwrap().enabled)
    }

    async fn set_radio_enabled(&self, enabled: bool) -> ConnectivityResult<()> {
        let mut state = self.state.lock().unwrap();
        state.radio_toggles += 1;
        state.enabled = enabled;
        if !enabled {
            state.current = None;
        }
        Ok(())
    }
}

/// A probe whose answer the test controls.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    online: Arc<AtomicBool>,
    hang: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
}

impl MockProbe {
    pub fn new(online: bool) -> Self {
        let probe = Self::default();
        probe.set_online(online);
        probe
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes every probe hang until the caller gives up.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for MockProbe {
    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.online.load(Ordering::SeqCst)
    }
}
