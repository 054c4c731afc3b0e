//! FaceLog attendance checkpoint.
//!
//! Loads [`EdgeConfig`], builds the production component stack with
//! [`build`] and formats what the pipeline reports for a terminal. The
//! binary in `main.rs` is a thin command-line shell over this.

pub mod config;
pub mod display;
pub mod health;
pub mod input;
mod wiring;

pub use config::{CameraConfig, EdgeConfig, KnownNetwork};
pub use health::{DeviceHealth, HealthConfig, HealthMonitor, spawn_health_monitor};
pub use input::{StationCommand, parse_command};
pub use wiring::{build, build_camera};
