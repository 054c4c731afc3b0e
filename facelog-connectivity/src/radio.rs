//! Radio backend abstraction.

use crate::error::ConnectivityResult;
use async_trait::async_trait;
use facelog_types::NetworkInfo;

/// Controls the device's wireless radio.
///
/// Implementations report raw device state; idempotency ("already in the
/// requested state") is handled by the manager.
#[async_trait]
pub trait RadioBackend: Send + Sync {
    /// Visible networks, in whatever order the device reports them.
    async fn list_networks(&self) -> ConnectivityResult<Vec<NetworkInfo>>;

    /// Joins `ssid`, using `secret` for secured networks.
    async fn connect(&self, ssid: &str, secret: Option<&str>) -> ConnectivityResult<()>;

    /// Drops the current association.
    async fn disconnect(&self) -> ConnectivityResult<()>;

    async fn radio_enabled(&self) -> ConnectivityResult<bool>;

    async fn set_radio_enabled(&self, enabled: bool) -> ConnectivityResult<()>;

    /// SSID of the network currently in use, if any.
    async fn current_network(&self) -> ConnectivityResult<Option<String>> {
        Ok(self
            .list_networks()
            .await?
            .into_iter()
            .find(|n| n.is_current)
            .map(|n| n.ssid))
    }
}
