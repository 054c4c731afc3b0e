//! Builds the production component stack.

use crate::config::{CameraConfig, EdgeConfig};
use anyhow::{Context, Result};
use facelog_cache::{CacheHandle, LocalCache};
use facelog_capture::{CameraDevice, CaptureController, CommandCamera, StillImageCamera};
use facelog_connectivity::{ConnectivityManager, HttpProbe, NmcliRadio};
use facelog_pipeline::Orchestrator;
use facelog_recognition::{HttpTransport, RecognitionClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub fn build_camera(config: &CameraConfig) -> Arc<dyn CameraDevice> {
    match config {
        CameraConfig::Command {
            program,
            args,
            device,
        } => {
            let mut camera = CommandCamera::new(program.clone(), args.clone());
            if let Some(device) = device {
                camera = camera.with_device(device.clone());
            }
            Arc::new(camera)
        }
        CameraConfig::StillImage { path } => Arc::new(StillImageCamera::new(path.clone())),
    }
}

/// Wires camera, HTTP client, cache and connectivity into an orchestrator.
///
/// Opens (and if needed creates) the cache under `data_dir`. Nothing touches
/// the camera or the network yet.
pub fn build(config: &EdgeConfig) -> Result<Arc<Orchestrator>> {
    let camera = build_camera(&config.camera);
    debug!(camera = %camera.describe(), "Camera configured");
    let capture = Arc::new(CaptureController::new(camera));

    let transport =
        HttpTransport::new(config.server.clone()).context("Failed to build HTTP transport")?;
    let recognition = Arc::new(RecognitionClient::new(
        Arc::new(transport),
        config.recognition.clone(),
    ));

    let cache_path = config.cache_path();
    let store = LocalCache::open(&cache_path)
        .with_context(|| format!("Failed to open cache at {}", cache_path.display()))?;
    let cache = CacheHandle::spawn(store).context("Failed to start cache writer")?;

    let probe = HttpProbe::new(
        &config.server.base_url,
        Duration::from_millis(config.connectivity.probe_timeout_ms),
    )
    .context("Failed to build reachability probe")?;
    let connectivity = Arc::new(ConnectivityManager::new(
        Arc::new(NmcliRadio::new(config.nmcli.clone())),
        Arc::new(probe),
        config.connectivity.clone(),
    ));
    if let Some(known) = &config.known_network {
        connectivity
            .remember_network(&known.ssid, known.secret.as_deref())
            .context("Failed to remember configured network")?;
    }

    info!(
        server = %config.server.base_url,
        device_id = %config.recognition.device_id,
        cache = %cache_path.display(),
        "Checkpoint assembled"
    );
    Ok(Arc::new(Orchestrator::new(
        capture,
        recognition,
        cache,
        connectivity,
        config.pipeline.clone(),
    )))
}
