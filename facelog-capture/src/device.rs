//! Camera device abstraction.
//!
//! The controller only ever talks to a [`CameraDevice`]; an external frame
//! grabber, a still image on disk and the test mock all sit behind it.

use crate::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::debug;

/// A camera the controller can power up and grab frames from.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Human-readable description used in logs and errors.
    fn describe(&self) -> String;

    /// Whether the hardware is enumerated at all.
    async fn is_present(&self) -> bool;

    /// Powers the device up. Called once per `open()`.
    async fn start(&self) -> CaptureResult<()>;

    /// Powers the device down.
    async fn stop(&self) -> CaptureResult<()>;

    /// Grabs one encoded frame. May take arbitrarily long; the controller
    /// bounds it with the capture timeout.
    async fn grab(&self) -> CaptureResult<Vec<u8>>;
}

/// A "camera" that returns the current contents of an image file.
///
/// Used on headless checkpoints where an external process keeps writing the
/// latest frame to a known path.
#[derive(Debug, Clone)]
pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl CameraDevice for StillImageCamera {
    fn describe(&self) -> String {
        format!("still image at {}", self.path.display())
    }

    async fn is_present(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn start(&self) -> CaptureResult<()> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {e}", self.describe())))?;
        if !meta.is_file() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} is not a file",
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn stop(&self) -> CaptureResult<()> {
        Ok(())
    }

    async fn grab(&self) -> CaptureResult<Vec<u8>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CaptureError::Failed(format!("reading {}: {e}", self.path.display())))?;
        debug!(len = bytes.len(), "Read still frame");
        Ok(bytes)
    }
}

/// A camera driven by an external frame grabber that writes one encoded
/// frame to stdout, e.g. `fswebcam --no-banner -` or
/// `libcamera-still -n -o -`.
///
/// The grabber is killed if the capture is cancelled.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    device: Option<PathBuf>,
}

impl CommandCamera {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            device: None,
        }
    }

    /// Device node that must exist for the camera to count as present.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = Some(device.into());
        self
    }
}

#[async_trait]
impl CameraDevice for CommandCamera {
    fn describe(&self) -> String {
        match &self.device {
            Some(device) => format!("{} on {}", self.program, device.display()),
            None => self.program.clone(),
        }
    }

    async fn is_present(&self) -> bool {
        match &self.device {
            Some(device) => tokio::fs::try_exists(device).await.unwrap_or(false),
            None => true,
        }
    }

    async fn start(&self) -> CaptureResult<()> {
        if !self.is_present().await {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} not found",
                self.describe()
            )));
        }
        Ok(())
    }

    async fn stop(&self) -> CaptureResult<()> {
        Ok(())
    }

    async fn grab(&self) -> CaptureResult<Vec<u8>> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        debug!(len = output.stdout.len(), "Grabbed frame");
        Ok(output.stdout)
    }
}

/// A scriptable camera for testing.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What the next `grab` should do.
    #[derive(Debug, Clone)]
    pub enum MockFrame {
        /// Return these bytes.
        Image(Vec<u8>),
        /// Fail with `CaptureError::Failed`.
        Error(String),
        /// Never complete.
        Hang,
    }

    #[derive(Debug)]
    struct Inner {
        present: bool,
        start_error: Option<String>,
        start_delay: Option<Duration>,
        grab_delay: Option<Duration>,
        script: VecDeque<MockFrame>,
        fallback: Vec<u8>,
        starts: usize,
        stops: usize,
        grabs: usize,
    }

    /// A mock camera. Clones share state, so a test can keep one and hand
    /// another to the controller.
    #[derive(Debug, Clone)]
    pub struct MockCamera {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockCamera {
        /// A present camera that returns a small fake JPEG on every grab.
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(Inner {
                    present: true,
                    start_error: None,
                    start_delay: None,
                    grab_delay: None,
                    script: VecDeque::new(),
                    fallback: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9],
                    starts: 0,
                    stops: 0,
                    grabs: 0,
                })),
            }
        }

        /// A camera that is not enumerated.
        pub fn absent() -> Self {
            let camera = Self::new();
            camera.set_present(false);
            camera
        }

        pub fn set_present(&self, present: bool) {
            self.inner.lock().unwrap().present = present;
        }

        /// Makes `start` fail with the given message.
        pub fn fail_start(&self, message: impl Into<String>) {
            self.inner.lock().unwrap().start_error = Some(message.into());
        }

        pub fn set_start_delay(&self, delay: Duration) {
            self.inner.lock().unwrap().start_delay = Some(delay);
        }

        pub fn set_grab_delay(&self, delay: Duration) {
            self.inner.lock().unwrap().grab_delay = Some(delay);
        }

        /// Queues the result of a future grab. Unscripted grabs return the
        /// fallback frame.
        pub fn push_frame(&self, frame: MockFrame) {
            self.inner.lock().unwrap().script.push_back(frame);
        }

        pub fn set_fallback(&self, bytes: Vec<u8>) {
            self.inner.lock().unwrap().fallback = bytes;
        }

        pub fn start_count(&self) -> usize {
            self.inner.lock().unwrap().starts
        }

        pub fn stop_count(&self) -> usize {
            self.inner.lock().unwrap().stops
        }

        pub fn grab_count(&self) -> usize {
            self.inner.lock().unwrap().grabs
        }
    }

    impl Default for MockCamera {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CameraDevice for MockCamera {
        fn describe(&self) -> String {
            "mock camera".to_string()
        }

        async fn is_present(&self) -> bool {
            self.inner.lock().unwrap().present
        }

        async fn start(&self) -> CaptureResult<()> {
            let (delay, error) = {
                let mut inner = self.inner.lock().unwrap();
                inner.starts += 1;
                (inner.start_delay, inner.start_error.clone())
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match error {
                Some(message) => Err(CaptureError::DeviceUnavailable(message)),
                None => Ok(()),
            }
        }

        async fn stop(&self) -> CaptureResult<()> {
            self.inner.lock().unwrap().stops += 1;
            Ok(())
        }

        async fn grab(&self) -> CaptureResult<Vec<u8>> {
            let (delay, frame) = {
                let mut inner = self.inner.lock().unwrap();
                inner.grabs += 1;
                let frame = inner
                    .script
                    .pop_front()
                    .unwrap_or_else(|| MockFrame::Image(inner.fallback.clone()));
                (inner.grab_delay, frame)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match frame {
                MockFrame::Image(bytes) => Ok(bytes),
                MockFrame::Error(message) => Err(CaptureError::Failed(message)),
                MockFrame::Hang => std::future::pending().await,
            }
        }
    }
}
