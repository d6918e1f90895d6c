// ── Core error types ──
//
// User-facing errors from thekeys-core. These are NOT wire-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<thekeys_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Authentication / configuration ───────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Not connected -- call connect() first")]
    NotConnected,

    // ── Gateway errors ───────────────────────────────────────────────
    /// The gateway never reported a ready status within the bounded
    /// readiness poll. Heavy lock commands are refused rather than
    /// dispatched into a mid-scan gateway.
    #[error("Gateway {gateway} not ready after {attempts} status polls")]
    GatewayNotReady { gateway: String, attempts: u32 },

    #[error("Gateway unreachable at {gateway}: {reason}")]
    GatewayUnreachable { gateway: String, reason: String },

    /// The gateway answered but refused the operation.
    #[error("Gateway refused operation (code {code}): {message}")]
    Rejected { code: i64, message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Lock not found: {id}")]
    LockNotFound { id: i64 },

    /// The lock exists but no gateway serves it (no paired gateway in
    /// the inventory and no configured address).
    #[error("No gateway available for lock {lock_id}")]
    NoGateway { lock_id: i64 },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Cloud API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<thekeys_api::Error> for CoreError {
    fn from(err: thekeys_api::Error) -> Self {
        match err {
            thekeys_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            thekeys_api::Error::InvalidAddress { input, reason } => CoreError::Config {
                message: format!("invalid gateway address {input:?}: {reason}"),
            },
            thekeys_api::Error::Service { message, status } => CoreError::Api {
                message,
                status: Some(status),
            },
            thekeys_api::Error::GatewayUnreachable { host, reason } => {
                CoreError::GatewayUnreachable {
                    gateway: host,
                    reason,
                }
            }
            thekeys_api::Error::GatewayOperation { code, message } => {
                CoreError::Rejected { code, message }
            }
            thekeys_api::Error::Transport(e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            thekeys_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            thekeys_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("deserialization error: {message}"))
            }
        }
    }
}
