//! Device health of the checkpoint itself.
//!
//! While running, samples are taken periodically and threshold breaches
//! are logged as warnings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Components, Disks, MINIMUM_CPU_UPDATE_INTERVAL, System};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Health monitoring thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between samples while running (0 = no periodic sampling).
    pub interval_secs: u64,
    /// Warn when the filesystem holding the cache is fuller than this.
    pub storage_warn_percent: f32,
    /// Warn when memory use exceeds this.
    pub memory_warn_percent: f32,
    /// Warn above this SoC temperature (°C).
    pub temperature_warn_c: f32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            storage_warn_percent: 90.0,
            memory_warn_percent: 90.0,
            temperature_warn_c: 80.0,
        }
    }
}

impl HealthConfig {
    /// `None` when periodic sampling is disabled.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

/// Space on one filesystem, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used: u64,
    pub total: u64,
}

impl Usage {
    #[must_use]
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.used as f64 / self.total as f64 * 100.0) as f32
        }
    }
}

/// One sample of the device's vital signs.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceHealth {
    pub hostname: Option<String>,
    pub uptime: Duration,
    /// 1, 5 and 15 minute load averages.
    pub load_average: [f64; 3],
    /// Average over all cores since the previous sample.
    pub cpu_percent: f32,
    pub memory: Usage,
    /// The filesystem holding the cache, if it could be found.
    pub storage: Option<Usage>,
    pub temperature_c: Option<f32>,
}

impl DeviceHealth {
    /// Thresholds this sample exceeds, as operator-readable lines.
    #[must_use]
    pub fn warnings(&self, config: &HealthConfig) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(storage) = self.storage {
            if storage.percent() > config.storage_warn_percent {
                warnings.push(format!("storage {:.0}% full", storage.percent()));
            }
        }
        if self.memory.percent() > config.memory_warn_percent {
            warnings.push(format!("memory {:.0}% used", self.memory.percent()));
        }
        if let Some(temp) = self.temperature_c {
            if temp > config.temperature_warn_c {
                warnings.push(format!("temperature {temp:.1}°C"));
            }
        }
        warnings
    }
}

/// Samples device health. Keeps CPU counters between samples, so the CPU
/// figure covers the time since the previous one.
pub struct HealthMonitor {
    system: System,
    data_dir: PathBuf,
}

impl HealthMonitor {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system,
            data_dir: data_dir.into(),
        }
    }

    pub fn sample(&mut self) -> DeviceHealth {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        let load = System::load_average();

        let data_dir = self
            .data_dir
            .canonicalize()
            .unwrap_or_else(|_| self.data_dir.clone());
        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<_> = disks
            .iter()
            .map(|d| {
                let total = d.total_space();
                (
                    d.mount_point().to_path_buf(),
                    Usage {
                        used: total.saturating_sub(d.available_space()),
                        total,
                    },
                )
            })
            .collect();

        let components = Components::new_with_refreshed_list();
        let sensors: Vec<_> = components
            .iter()
            .map(|c| (c.label().to_string(), c.temperature()))
            .collect();

        DeviceHealth {
            hostname: System::host_name(),
            uptime: Duration::from_secs(System::uptime()),
            load_average: [load.one, load.five, load.fifteen],
            cpu_percent: self.system.global_cpu_usage(),
            memory: Usage {
                used: self.system.used_memory(),
                total: self.system.total_memory(),
            },
            storage: storage_for(&data_dir, &mounts),
            temperature_c: soc_temperature(&sensors),
        }
    }

    /// Samples after one CPU measurement window, for one-shot readings.
    pub async fn sample_settled(&mut self) -> DeviceHealth {
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        self.sample()
    }
}

/// Usage of the mount that contains `path` (longest matching mount point).
pub fn storage_for(path: &Path, mounts: &[(PathBuf, Usage)]) -> Option<Usage> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, usage)| *usage)
}

/// Picks the SoC reading from the available sensors.
///
/// Prefers sensors labelled as CPU/SoC, falls back to the hottest reading.
/// Unreadable sensors (NaN) are ignored.
pub fn soc_temperature(sensors: &[(String, f32)]) -> Option<f32> {
    let readable: Vec<_> = sensors.iter().filter(|(_, t)| t.is_finite()).collect();
    readable
        .iter()
        .filter(|(label, _)| is_soc_sensor(label))
        .map(|(_, t)| *t)
        .reduce(f32::max)
        .or_else(|| readable.iter().map(|(_, t)| *t).reduce(f32::max))
}

fn is_soc_sensor(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    ["cpu", "soc", "core", "package"]
        .iter()
        .any(|key| label.contains(key))
}

/// Samples every `interval` and logs threshold breaches until aborted.
pub fn spawn_health_monitor(config: HealthConfig, data_dir: PathBuf) -> Option<JoinHandle<()>> {
    let interval = config.interval()?;
    Some(tokio::spawn(async move {
        let mut monitor = HealthMonitor::new(data_dir);
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let health = monitor.sample();
            debug!(
                cpu = health.cpu_percent,
                memory = health.memory.percent(),
                storage = health.storage.map(|s| s.percent()),
                temperature = health.temperature_c,
                "Device health"
            );
            for warning in health.warnings(&config) {
                warn!(%warning, "Device health threshold exceeded");
            }
        }
    }))
}
