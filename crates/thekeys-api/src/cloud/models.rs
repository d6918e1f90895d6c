// Cloud API wire models
//
// The cloud exposes the account's locks as "shares": each share pairs a
// locker with the share code the gateway protocol signs requests with.
// These structs mirror the JSON shapes as served; domain conversion
// happens in thekeys-core.

use serde::Deserialize;

/// Response body of `POST /api/login_check`.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// One share from `GET /fr/api/v2/share/all`.
///
/// The share `code` is the per-lock secret used to sign gateway requests.
#[derive(Debug, Clone, Deserialize)]
pub struct Share {
    pub id: i64,
    pub code: String,
    pub locker: LockerInfo,
    /// Absent when the lock has no paired gateway (app-only operation).
    #[serde(default)]
    pub gateway: Option<GatewayInfo>,
}

/// Lock metadata as reported by the cloud.
#[derive(Debug, Clone, Deserialize)]
pub struct LockerInfo {
    pub id: i64,
    pub name: String,
    /// Raw battery telemetry. Systematically optimistic; see
    /// thekeys-core's calibration module.
    #[serde(default)]
    pub battery: Option<f64>,
    /// Last state known to the cloud. Often stale; the gateway's
    /// `locker_status` is authoritative.
    #[serde(default)]
    pub locked: Option<bool>,
}

/// Gateway metadata as reported by the cloud.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInfo {
    pub id: i64,
    /// LAN host the cloud last saw the gateway on. A configured
    /// gateway address overrides this.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
}
