//! Camera capture for the FaceLog checkpoint.
//!
//! [`CaptureController`] owns the one camera on the device and turns it into
//! a single-shot async capture with an explicit timeout. The hardware sits
//! behind the [`CameraDevice`] trait so the controller can be driven by a
//! still-image source on headless installs or by [`mock::MockCamera`] in
//! tests.

mod controller;
mod device;
mod error;
mod state;

pub use controller::CaptureController;
pub use device::{CameraDevice, CommandCamera, StillImageCamera, mock};
pub use error::{CaptureError, CaptureResult};
pub use state::CaptureState;
