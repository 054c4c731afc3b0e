//! The capture controller.

use crate::device::CameraDevice;
use crate::error::{CaptureError, CaptureResult};
use crate::state::CaptureState;
use facelog_types::CapturedImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Exclusive owner of the camera.
///
/// At most one capture is in flight. A capture requested before the camera
/// is ready is parked as a single deferred attempt and retried when the
/// camera reaches `Ready`, within the same timeout.
pub struct CaptureController {
    device: Arc<dyn CameraDevice>,
    state: watch::Sender<CaptureState>,
    deferred: AtomicBool,
    open_lock: Mutex<()>,
}

impl CaptureController {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        let (state, _) = watch::channel(CaptureState::Closed);
        Self {
            device,
            state,
            deferred: AtomicBool::new(false),
            open_lock: Mutex::new(()),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    /// Watches state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Opens the camera.
    ///
    /// Idempotent: returns immediately if the camera is already open. Fails
    /// with [`CaptureError::DeviceUnavailable`] if no camera is enumerated,
    /// which leaves the controller permanently `Failed` until [`close`].
    ///
    /// [`close`]: Self::close
    pub async fn open(&self) -> CaptureResult<()> {
        let _guard = self.open_lock.lock().await;

        let current = self.state();
        match current {
            CaptureState::Ready | CaptureState::Capturing | CaptureState::Failed { permanent: false } => {
                return Ok(());
            }
            CaptureState::Failed { permanent: true } => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "{} failed; close it before reopening",
                    self.device.describe()
                )));
            }
            CaptureState::Closed | CaptureState::Opening => {}
        }

        self.state.send_replace(CaptureState::Opening);
        let _opening = OpeningGuard(&self.state);
        debug!(device = %self.device.describe(), "Opening camera");

        if !self.device.is_present().await {
            self.state.send_replace(CaptureState::Failed { permanent: true });
            warn!(device = %self.device.describe(), "No camera found");
            return Err(CaptureError::DeviceUnavailable(format!(
                "no camera found ({})",
                self.device.describe()
            )));
        }

        if let Err(e) = self.device.start().await {
            self.state.send_replace(CaptureState::Failed { permanent: true });
            warn!(error = %e, "Camera failed to start");
            return Err(match e {
                CaptureError::DeviceUnavailable(_) => e,
                other => CaptureError::DeviceUnavailable(other.to_string()),
            });
        }

        self.state.send_replace(CaptureState::Ready);
        info!(device = %self.device.describe(), "Camera ready");
        Ok(())
    }

    /// Releases the camera. Safe from any state; an in-flight capture is
    /// abandoned and fails with [`CaptureError::DeviceUnavailable`].
    pub async fn close(&self) {
        let _guard = self.open_lock.lock().await;
        let previous = self.state.send_replace(CaptureState::Closed);
        if previous == CaptureState::Closed {
            return;
        }
        if let Err(e) = self.device.stop().await {
            warn!(error = %e, "Camera did not stop cleanly");
        }
        info!(previous = %previous, "Camera closed");
    }

    /// Captures one frame, waiting at most `timeout` overall.
    ///
    /// Fails immediately with [`CaptureError::CaptureBusy`] if a capture is
    /// already in flight or another deferred attempt is already parked.
    /// Dropping the returned future cancels the attempt and returns the
    /// controller to `Ready`.
    pub async fn capture(&self, timeout: Duration) -> CaptureResult<CapturedImage> {
        let deadline = Instant::now() + timeout;

        match self.try_claim() {
            Ok(()) => {}
            Err(CaptureState::Capturing) => return Err(CaptureError::CaptureBusy),
            Err(CaptureState::Failed { permanent: true }) => {
                return Err(CaptureError::DeviceUnavailable(self.device.describe()));
            }
            Err(state) => self.deferred_claim(state, deadline, timeout).await?,
        }

        let _capturing = CapturingGuard(&self.state);
        let mut rx = self.state.subscribe();
        let grab = async {
            tokio::select! {
                result = self.device.grab() => Some(result),
                _ = rx.wait_for(|state| *state == CaptureState::Closed) => None,
            }
        };
        match timeout_at(deadline, grab).await {
            Err(_) => {
                warn!(?timeout, "Capture timed out");
                Err(CaptureError::CaptureTimeout(timeout))
            }
            Ok(None) => {
                debug!("Camera closed during capture");
                Err(CaptureError::DeviceUnavailable("camera was closed".into()))
            }
            Ok(Some(Err(e))) => {
                self.transient_failure(&e);
                Err(match e {
                    CaptureError::Failed(_) => e,
                    other => CaptureError::Failed(other.to_string()),
                })
            }
            Ok(Some(Ok(bytes))) if bytes.is_empty() => {
                let e = CaptureError::Failed("device returned an empty frame".into());
                self.transient_failure(&e);
                Err(e)
            }
            Ok(Some(Ok(bytes))) => {
                let image = CapturedImage::new(bytes);
                debug!(capture_id = %image.capture_id(), len = image.len(), "Frame captured");
                Ok(image)
            }
        }
    }

    /// Moves `Ready` to `Capturing`. On failure returns the observed state.
    fn try_claim(&self) -> Result<(), CaptureState> {
        let mut observed = CaptureState::Closed;
        let claimed = self.state.send_if_modified(|state| {
            observed = *state;
            if *state == CaptureState::Ready {
                *state = CaptureState::Capturing;
                true
            } else {
                false
            }
        });
        if claimed { Ok(()) } else { Err(observed) }
    }

    async fn deferred_claim(
        &self,
        observed: CaptureState,
        deadline: Instant,
        timeout: Duration,
    ) -> CaptureResult<()> {
        if self.deferred.swap(true, Ordering::AcqRel) {
            return Err(CaptureError::CaptureBusy);
        }
        let _slot = DeferredSlot(&self.deferred);
        debug!(state = %observed, "Camera not ready; deferring capture");

        let mut rx = self.state.subscribe();
        if observed == CaptureState::Closed {
            match timeout_at(deadline, self.open()).await {
                Err(_) => return Err(CaptureError::CaptureTimeout(timeout)),
                Ok(result) => result?,
            }
        }

        loop {
            match self.try_claim() {
                Ok(()) => return Ok(()),
                Err(CaptureState::Failed { permanent: true }) => {
                    return Err(CaptureError::DeviceUnavailable(self.device.describe()));
                }
                Err(CaptureState::Closed) => {
                    return Err(CaptureError::DeviceUnavailable("camera was closed".into()));
                }
                Err(_) => {}
            }

            let changed = timeout_at(deadline, async {
                rx.wait_for(|state| {
                    matches!(
                        state,
                        CaptureState::Ready
                            | CaptureState::Closed
                            | CaptureState::Failed { permanent: true }
                    )
                })
                .await
                .map(|state| *state)
            })
            .await;

            match changed {
                Err(_) => return Err(CaptureError::CaptureTimeout(timeout)),
                Ok(Err(_)) => return Err(CaptureError::Failed("state channel closed".into())),
                Ok(Ok(_)) => {}
            }
        }
    }

    fn transient_failure(&self, error: &CaptureError) {
        warn!(error = %error, "Capture failed; recovering");
        let failed = self.state.send_if_modified(|state| {
            if *state == CaptureState::Capturing {
                *state = CaptureState::Failed { permanent: false };
                true
            } else {
                false
            }
        });
        if failed {
            self.state.send_if_modified(|state| {
                if matches!(*state, CaptureState::Failed { permanent: false }) {
                    *state = CaptureState::Ready;
                    true
                } else {
                    false
                }
            });
        }
    }
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("device", &self.device.describe())
            .field("state", &self.state())
            .finish()
    }
}

/// Returns the controller to `Ready` when a capture ends, unless someone
/// closed or failed it in the meantime.
struct CapturingGuard<'a>(&'a watch::Sender<CaptureState>);

impl Drop for CapturingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|state| {
            if *state == CaptureState::Capturing {
                *state = CaptureState::Ready;
                true
            } else {
                false
            }
        });
    }
}

/// Falls back to `Closed` if an open is abandoned halfway.
struct OpeningGuard<'a>(&'a watch::Sender<CaptureState>);

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|state| {
            if *state == CaptureState::Opening {
                *state = CaptureState::Closed;
                true
            } else {
                false
            }
        });
    }
}

/// Frees the single deferred slot.
struct DeferredSlot<'a>(&'a AtomicBool);

impl Drop for DeferredSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
