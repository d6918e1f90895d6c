// ── Runtime client configuration ──
//
// Describes *how* to reach the cloud account and the local gateway.
// Carries credential data and tuning knobs, but never touches disk --
// the host application constructs a `ClientConfig` and hands it in.
// Defaults match the vendor's recommended values.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use thekeys_api::transport::TransportConfig;
use thekeys_api::{GatewayAddress, GatewayStatus};

use crate::error::CoreError;

/// The shortest scan interval the gateway tolerates without destabilizing.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for one The Keys account and its gateway.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account username: phone number in international format.
    pub username: String,
    /// Account password.
    pub password: SecretString,
    /// Cloud API base URL.
    pub cloud_url: Url,
    /// Gateway address override. When `None`, the LAN host reported by
    /// the cloud inventory is used.
    pub gateway_address: Option<GatewayAddress>,
    /// How often the host should drive a full poll cycle. Minimum 10 s.
    pub scan_interval: Duration,
    /// Minimum spacing for light gateway operations (status/sync).
    pub light_delay: Duration,
    /// Minimum spacing for heavy gateway operations (open/close/
    /// calibrate/locker status).
    pub heavy_delay: Duration,
    /// How many light status polls to spend waiting for readiness
    /// before a heavy command fails with `GatewayNotReady`.
    pub readiness_max_polls: u32,
    /// Which self-reported gateway statuses count as ready for heavy
    /// calls. The exact ready condition is unconfirmed on some firmware,
    /// so this is a tunable rather than a constant.
    pub ready_statuses: Vec<GatewayStatus>,
    /// Backoff schedule for retrying status reads after the gateway
    /// resets the connection. Length bounds the attempt count.
    pub retry_backoff: Vec<Duration>,
    /// Wait before retrying when the gateway reports busy -- slightly
    /// more than the ~5 s a lock takes to physically move.
    pub busy_retry_delay: Duration,
    /// Consecutive unreachable cycles before a gateway is considered
    /// in error (its locks stay stale until it recovers).
    pub unreachable_error_threshold: u32,
    /// HTTP transport tuning.
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// A config for `username`/`password` with vendor defaults.
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            ..Self::default()
        }
    }

    /// Validate the tuning knobs, returning `CoreError::Config` for any
    /// out-of-range value.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |message: String| Err(CoreError::Config { message });

        if self.username.is_empty() {
            return fail("username must not be empty".into());
        }
        if self.scan_interval < MIN_SCAN_INTERVAL {
            return fail(format!(
                "scan interval {:?} below minimum {MIN_SCAN_INTERVAL:?}",
                self.scan_interval
            ));
        }
        if self.light_delay.is_zero() {
            return fail("light rate-limit delay must be positive".into());
        }
        if self.heavy_delay < self.light_delay {
            return fail(format!(
                "heavy delay {:?} must be at least the light delay {:?}",
                self.heavy_delay, self.light_delay
            ));
        }
        if self.readiness_max_polls == 0 {
            return fail("readiness poll budget must be at least 1".into());
        }
        if self.ready_statuses.is_empty() {
            return fail("at least one gateway status must count as ready".into());
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: SecretString::from(String::new()),
            cloud_url: Url::parse("https://api.the-keys.fr").expect("static URL"),
            gateway_address: None,
            scan_interval: Duration::from_secs(60),
            light_delay: Duration::from_secs(1),
            heavy_delay: Duration::from_secs(5),
            readiness_max_polls: 10,
            ready_statuses: vec![GatewayStatus::Idle],
            retry_backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            busy_retry_delay: Duration::from_secs(6),
            unreachable_error_threshold: 3,
            transport: TransportConfig::default(),
        }
    }
}
