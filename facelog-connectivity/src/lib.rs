//! Connectivity for the FaceLog checkpoint.
//!
//! [`ConnectivityManager`] answers "can we reach the service right now?" and
//! drives the WiFi radio for manual reconnection. The two concerns sit behind
//! separate seams:
//! - [`RadioBackend`] for scan/connect/radio power, implemented by
//!   [`NmcliRadio`] on NetworkManager hosts
//! - [`ReachabilityProbe`] for the online check, implemented by [`HttpProbe`]
//!
//! Test doubles for both live in [`mock`].

mod error;
mod manager;
pub mod mock;
mod nmcli;
mod probe;
mod radio;

pub use error::{ConnectivityError, ConnectivityResult};
pub use manager::{ConnectivityConfig, ConnectivityManager};
pub use nmcli::{NmcliConfig, NmcliRadio, parse_wifi_list};
pub use probe::{HttpProbe, ReachabilityProbe};
pub use radio::RadioBackend;
