//! Reachability probes.

use crate::error::{ConnectivityError, ConnectivityResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Answers whether the recognition service is reachable.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// One probe attempt. Any failure is `false`.
    async fn probe(&self) -> bool;
}

/// Probes `GET {base_url}/health`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: Client,
}

impl HttpProbe {
    pub fn new(base_url: &str, timeout: Duration) -> ConnectivityResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ConnectivityError::Probe(e.to_string()))?;
        Ok(Self {
            url: format!("{}/health", base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        }
    }
}
