//! NetworkManager (`nmcli`) radio backend.

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::radio::RadioBackend;
use async_trait::async_trait;
use facelog_types::NetworkInfo;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Signal reported for networks whose strength could not be read.
const DEFAULT_SIGNAL: u32 = 50;

/// `nmcli` backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NmcliConfig {
    /// Program to run.
    pub program: String,
    /// Wireless interface, used for `device disconnect`.
    pub interface: String,
    /// Per-command timeout in milliseconds. Connecting can take a while.
    pub command_timeout_ms: u64,
}

impl Default for NmcliConfig {
    fn default() -> Self {
        Self {
            program: "nmcli".to_string(),
            interface: "wlan0".to_string(),
            command_timeout_ms: 30_000,
        }
    }
}

/// Drives NetworkManager through its CLI.
#[derive(Debug, Clone, Default)]
pub struct NmcliRadio {
    config: NmcliConfig,
}

impl NmcliRadio {
    pub fn new(config: NmcliConfig) -> Self {
        Self { config }
    }

    async fn run(&self, args: &[&str]) -> ConnectivityResult<String> {
        // Never echo a password into logs or errors.
        let command = match args.iter().position(|a| *a == "password") {
            Some(i) => format!("{} {} password ***", self.config.program, args[..i].join(" ")),
            None => format!("{} {}", self.config.program, args.join(" ")),
        };
        let timeout = Duration::from_millis(self.config.command_timeout_ms);
        debug!(%command, "Running");

        let child = Command::new(&self.config.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Err(_) => return Err(ConnectivityError::CommandTimeout { command, timeout }),
            Ok(Err(e)) => {
                return Err(ConnectivityError::Spawn {
                    command,
                    message: e.to_string(),
                });
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exit status {}", output.status)
            } else {
                stderr
            };
            return Err(ConnectivityError::CommandFailed { command, message });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RadioBackend for NmcliRadio {
    async fn list_networks(&self) -> ConnectivityResult<Vec<NetworkInfo>> {
        let output = self
            .run(&["-t", "-f", "IN-USE,SSID,SIGNAL,SECURITY", "device", "wifi", "list"])
            .await?;
        let networks = parse_wifi_list(&output);
        debug!(count = networks.len(), "Scanned networks");
        Ok(networks)
    }

    async fn connect(&self, ssid: &str, secret: Option<&str>) -> ConnectivityResult<()> {
        let mut args = vec!["device", "wifi", "connect", ssid];
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            args.extend(["password", secret]);
        }
        self.run(&args).await?;
        info!(ssid, "Connected");
        Ok(())
    }

    async fn disconnect(&self) -> ConnectivityResult<()> {
        self.run(&["device", "disconnect", self.config.interface.as_str()])
            .await?;
        info!(interface = %self.config.interface, "Disconnected");
        Ok(())
    }

    async fn radio_enabled(&self) -> ConnectivityResult<bool> {
        let output = self.run(&["radio", "wifi"]).await?;
        Ok(output.trim() == "enabled")
    }

    async fn set_radio_enabled(&self, enabled: bool) -> ConnectivityResult<()> {
        let state = if enabled { "on" } else { "off" };
        self.run(&["radio", "wifi", state]).await?;
        info!(enabled, "Set wifi radio");
        Ok(())
    }
}

/// Parses `nmcli -t -f IN-USE,SSID,SIGNAL,SECURITY device wifi list`.
///
/// Entries with an empty SSID are dropped. When several access points share
/// an SSID, one entry is kept with the strongest signal, marked current if
/// any of them is in use.
pub fn parse_wifi_list(output: &str) -> Vec<NetworkInfo> {
    let mut networks: Vec<NetworkInfo> = Vec::new();

    for line in output.lines() {
        let fields = split_terse(line);
        if fields.len() < 4 {
            continue;
        }

        let ssid = fields[1].trim();
        if ssid.is_empty() {
            continue;
        }
        let is_current = fields[0].trim() == "*";
        let signal = fields[2].trim().parse().unwrap_or(DEFAULT_SIGNAL);
        let security = fields[3].trim();
        let secured = !(security.is_empty() || security == "--");

        let network = NetworkInfo::new(ssid, signal, secured, is_current);
        match networks.iter_mut().find(|n| n.ssid == network.ssid) {
            Some(existing) => {
                existing.is_current |= network.is_current;
                if network.signal_strength > existing.signal_strength {
                    existing.signal_strength = network.signal_strength;
                    existing.secured = network.secured;
                }
            }
            None => networks.push(network),
        }
    }
    networks
}

/// Splits one terse-mode line on unescaped `:`. `\:` and `\\` are unescaped.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}
