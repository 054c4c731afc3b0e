//! Checkpoint configuration.
//!
//! Read from an optional JSON file; every section falls back to its
//! defaults, and a few values can be overridden from the command line.

use anyhow::{Context, Result};
use crate::health::HealthConfig;
use facelog_connectivity::{ConnectivityConfig, NmcliConfig};
use facelog_pipeline::PipelineConfig;
use facelog_recognition::{HttpTransportConfig, RecognitionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the local cache inside the data directory.
pub const CACHE_FILE: &str = "facelog.db";

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraConfig {
    /// An external grabber printing one JPEG to stdout.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Device node that must exist, e.g. `/dev/video0`.
        #[serde(default)]
        device: Option<PathBuf>,
    },
    /// The latest frame written to a file by another process.
    StillImage { path: PathBuf },
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::Command {
            program: "fswebcam".to_string(),
            args: ["--no-banner", "-r", "640x480", "--jpeg", "85", "-"]
                .map(String::from)
                .to_vec(),
            device: Some(PathBuf::from("/dev/video0")),
        }
    }
}

/// A network to fall back to when connectivity drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownNetwork {
    pub ssid: String,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Directory holding the local cache.
    pub data_dir: PathBuf,
    pub camera: CameraConfig,
    pub server: HttpTransportConfig,
    pub recognition: RecognitionConfig,
    pub pipeline: PipelineConfig,
    pub connectivity: ConnectivityConfig,
    pub nmcli: NmcliConfig,
    pub known_network: Option<KnownNetwork>,
    pub health: HealthConfig,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("facelog-data"),
            camera: CameraConfig::default(),
            server: HttpTransportConfig::default(),
            recognition: RecognitionConfig::default(),
            pipeline: PipelineConfig::default(),
            connectivity: ConnectivityConfig::default(),
            nmcli: NmcliConfig::default(),
            known_network: None,
            health: HealthConfig::default(),
        }
    }
}

impl EdgeConfig {
    /// Loads `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Applies command-line overrides.
    #[must_use]
    pub fn with_overrides(
        mut self,
        server_url: Option<String>,
        device_id: Option<String>,
        data_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(url) = server_url {
            self.server.base_url = url;
        }
        if let Some(device_id) = device_id {
            self.recognition.device_id = device_id;
        }
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE)
    }
}
