use thiserror::Error;

/// Top-level error type for the `thekeys-api` crate.
///
/// Covers every failure mode across both wire surfaces: the cloud API
/// (authentication, inventory) and the local gateway protocol.
/// `thekeys-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// The gateway address didn't match any accepted grammar
    /// (IPv4, IPv6, RFC 1123 hostname, each optionally with a port).
    #[error("Invalid gateway address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: String },

    // ── Cloud authentication ────────────────────────────────────────
    /// Login rejected (wrong credentials) or bearer token stale after
    /// the single transparent re-authentication attempt.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Non-auth failure from the cloud API. Surfaced, never retried.
    #[error("Cloud API error (HTTP {status}): {message}")]
    Service { message: String, status: u16 },

    // ── Gateway ─────────────────────────────────────────────────────
    /// Transport failure talking to the local gateway (connection
    /// refused/reset, timeout). The client does NOT retry these itself;
    /// the orchestrator decides, because blind retries during a gateway
    /// scan are known to fail repeatedly and burn the rate budget.
    #[error("Gateway unreachable at {host}: {reason}")]
    GatewayUnreachable { host: String, reason: String },

    /// Gateway answered but reported the operation failed
    /// (`"status": "ko"` envelope with a numeric code).
    #[error("Gateway refused operation (code {code}): {message}")]
    GatewayOperation { code: i64, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error on the cloud path (DNS failure, TLS, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

/// Gateway error code: the requested action is already in progress.
pub const GW_CODE_ACTION_STARTED: i64 = 400;
/// Gateway error code: the gateway is busy driving a lock.
pub const GW_CODE_BUSY: i64 = 500;
/// Gateway error code: the gateway clock is out of sync (signature rejected).
pub const GW_CODE_CLOCK_SKEW: i64 = 38;
/// Gateway error code: the signed timestamp is stale.
pub const GW_CODE_STALE_TIMESTAMP: i64 = 33;
/// Gateway error code: the lock did not answer over radio.
pub const GW_CODE_LOCK_OUT_OF_RANGE: i64 = 34;

impl Error {
    /// Returns `true` if the gateway is temporarily occupied and the
    /// operation is worth retrying after the lock finishes moving
    /// (physical travel takes about 5 seconds).
    pub fn is_gateway_busy(&self) -> bool {
        matches!(
            self,
            Self::GatewayOperation {
                code: GW_CODE_ACTION_STARTED | GW_CODE_BUSY,
                ..
            }
        )
    }

    /// Returns `true` if the gateway rejected the request signature
    /// because its clock drifted. A gateway `synchronize()` usually fixes it.
    pub fn is_clock_skew(&self) -> bool {
        matches!(self, Self::GatewayOperation { code: GW_CODE_CLOCK_SKEW, .. })
    }

    /// Returns `true` for the transient signature/radio codes worth a
    /// single retry before keeping the last known state.
    pub fn is_transient_locker_failure(&self) -> bool {
        matches!(
            self,
            Self::GatewayOperation {
                code: GW_CODE_STALE_TIMESTAMP | GW_CODE_LOCK_OUT_OF_RANGE,
                ..
            }
        )
    }

    /// Returns `true` if this error indicates the cached bearer token is
    /// stale and a re-login might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if the local gateway could not be reached at the
    /// transport level.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::GatewayUnreachable { .. })
    }
}
