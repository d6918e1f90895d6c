// ── Domain model ──
//
// Plain value objects converted from the cloud wire shapes. Snapshots
// are immutable per poll cycle: the orchestrator never mutates a
// published `LockSnapshot`, it replaces the whole vector.

use chrono::{DateTime, Utc};
use serde::Serialize;

use thekeys_api::cloud::Share;
use thekeys_api::{GatewayAddress, GatewayStatus};

/// Physical bolt state as far as we know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
    /// Never observed, or the last poll could not reach the lock.
    Unknown,
}

impl LockState {
    pub(crate) fn from_closed(closed: Option<bool>) -> Self {
        match closed {
            Some(true) => Self::Locked,
            Some(false) => Self::Unlocked,
            None => Self::Unknown,
        }
    }
}

/// A lock from the account inventory.
#[derive(Debug, Clone)]
pub struct Lock {
    pub id: i64,
    pub name: String,
    /// Per-lock share secret used to sign gateway requests.
    pub share_code: String,
    /// Raw battery telemetry (uncalibrated; see [`crate::battery`]).
    pub battery_raw: Option<f64>,
    /// Identifier of the gateway serving this lock. A non-owning
    /// back-reference; resolution happens against the same inventory
    /// snapshot, and a dangling reference is a transient inconsistency.
    pub gateway_id: Option<i64>,
    pub state: LockState,
}

impl Lock {
    /// Build a domain lock from a cloud share.
    pub fn from_share(share: &Share) -> Self {
        Self {
            id: share.locker.id,
            name: share.locker.name.clone(),
            share_code: share.code.clone(),
            battery_raw: share.locker.battery,
            gateway_id: share.gateway.as_ref().map(|g| g.id),
            state: LockState::from_closed(share.locker.locked),
        }
    }
}

/// A gateway from the account inventory.
#[derive(Debug, Clone)]
pub struct Gateway {
    pub id: i64,
    pub address: GatewayAddress,
    pub version: Option<u64>,
    /// Last status observed from the device itself (not the cloud).
    pub last_status: Option<GatewayStatus>,
}

/// One lock's state as exposed to the host application.
///
/// Replaced wholesale each poll cycle; `stale` marks entries whose
/// gateway could not be reached, which keep the last known good state
/// rather than being cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockSnapshot {
    pub id: i64,
    pub name: String,
    pub state: LockState,
    /// Calibrated battery percentage in `[0, 100]`.
    pub battery_percent: Option<f64>,
    /// When this lock was last successfully observed.
    pub last_seen: DateTime<Utc>,
    pub stale: bool,
}
