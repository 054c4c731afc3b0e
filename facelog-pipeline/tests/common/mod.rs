//! Shared test helpers for pipeline tests.

#![allow(dead_code)]

use facelog_cache::{CacheHandle, LocalCache};
use facelog_capture::CaptureController;
use facelog_capture::mock::MockCamera;
use facelog_connectivity::mock::{MockProbe, MockRadio};
use facelog_connectivity::{ConnectivityConfig, ConnectivityManager};
use facelog_pipeline::{Orchestrator, PipelineConfig};
use facelog_recognition::mock::{Method, MockTransport};
use facelog_recognition::{RecognitionClient, RecognitionConfig};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde_json::json;
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// A small valid PNG the encoder can work with.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 5 % 256) as u8, (y * 3 % 256) as u8, 90])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

/// An orchestrator wired to mocks, with the mocks kept for scripting.
pub struct Rig {
    pub camera: MockCamera,
    pub transport: MockTransport,
    pub probe: MockProbe,
    pub radio: MockRadio,
    pub orchestrator: Arc<Orchestrator>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_cache(config, LocalCache::open_in_memory().unwrap())
    }

    pub fn with_cache(config: PipelineConfig, store: LocalCache) -> Self {
        let camera = MockCamera::new();
        camera.set_fallback(png(64, 48));
        let transport = MockTransport::new();
        let probe = MockProbe::new(true);
        let radio = MockRadio::new();

        let capture = Arc::new(CaptureController::new(Arc::new(camera.clone())));
        let recognition = Arc::new(RecognitionClient::new(
            Arc::new(transport.clone()),
            RecognitionConfig::default(),
        ));
        let cache = CacheHandle::spawn(store).unwrap();
        let connectivity = Arc::new(ConnectivityManager::new(
            Arc::new(radio.clone()),
            Arc::new(probe.clone()),
            ConnectivityConfig::default(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            capture,
            recognition,
            cache,
            connectivity,
            config,
        ));
        Self {
            camera,
            transport,
            probe,
            radio,
            orchestrator,
        }
    }

    /// Every recognition request matches `name`.
    pub fn recognize_as(&self, subject_id: &str, name: &str) {
        let reply = json!({
            "matched": true,
            "user_id": subject_id,
            "name": name,
            "distance": 0.31,
        });
        self.transport
            .on(Method::Post, "/recognize", move |_| Ok(reply.clone()));
    }

    /// Every recognition request is answered with "no match".
    pub fn recognize_nobody(&self) {
        self.transport.on(Method::Post, "/recognize", |_| {
            Ok(json!({ "matched": false, "distance": 0.92 }))
        });
    }

    /// Ids of the `POST /attendance` requests, in the order they were made.
    pub fn submitted_ids(&self) -> Vec<String> {
        self.transport
            .requests_to(Method::Post, "/attendance")
            .into_iter()
            .filter_map(|r| r.body.and_then(|b| b.get("id").and_then(|v| v.as_str().map(String::from))))
            .collect()
    }
}

/// Polls `check` until it holds, for up to five seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
