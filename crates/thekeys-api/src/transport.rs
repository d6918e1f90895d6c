// Shared transport configuration for building reqwest::Client instances.
//
// Both the cloud and gateway clients share timeout settings through this
// module. The gateway speaks plain HTTP on the LAN and is slow to answer
// while driving a lock, so its timeout is tracked separately from the
// cloud round-trip timeout.

use std::time::Duration;

use crate::error::Error;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Cloud API request timeout.
    pub timeout: Duration,
    /// Local gateway request timeout. The gateway firmware holds the
    /// connection open while a lock is physically moving, so this must
    /// comfortably exceed the ~5s lock travel time.
    pub gateway_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            gateway_timeout: Duration::from_secs(15),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` for the cloud API.
    pub fn build_cloud_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("thekeys-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Transport)
    }

    /// Build a `reqwest::Client` for the local gateway.
    pub fn build_gateway_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.gateway_timeout)
            .user_agent(concat!("thekeys-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Transport)
    }
}
