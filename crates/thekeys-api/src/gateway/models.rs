// Gateway wire models
//
// The gateway reports its condition as a free-text `current_status`
// string. The known values form a closed set, but firmware revisions
// have shipped undocumented strings (and some append progress detail,
// e.g. "Synchronizing 3/6"), so parsing is keyword-based and anything
// unrecognized maps to `Unknown` rather than failing.

use std::fmt;

use serde::Deserialize;

/// The gateway's self-reported condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    /// Refreshing its internal lock list from the cloud. Heavy calls
    /// issued now reliably fail or reset the connection.
    Synchronizing,
    /// Radio-scanning for paired locks. Heavy calls are unreliable
    /// until the scan completes.
    Scanning,
    /// Idle and ready to relay lock commands.
    Idle,
    /// The gateway reported an internal error.
    Error,
    /// Unrecognized firmware status string, carried verbatim.
    Unknown(String),
}

impl GatewayStatus {
    /// Parse a wire status string. Never fails.
    pub fn from_wire(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("synchroniz") {
            Self::Synchronizing
        } else if lower.contains("scan") {
            Self::Scanning
        } else if lower.contains("idle") {
            Self::Idle
        } else if lower.contains("error") {
            Self::Error
        } else {
            Self::Unknown(raw.to_owned())
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synchronizing => write!(f, "synchronizing"),
            Self::Scanning => write!(f, "scanning"),
            Self::Idle => write!(f, "idle"),
            Self::Error => write!(f, "error"),
            Self::Unknown(raw) => write!(f, "unknown ({raw})"),
        }
    }
}

/// Raw shape of `GET /status`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawStatusReport {
    #[serde(default)]
    pub current_status: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub lockers: Option<u32>,
}

/// Parsed result of `GET /status`.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: GatewayStatus,
    /// Firmware/protocol version.
    pub version: Option<u64>,
    /// Number of locks the gateway currently knows about.
    pub locker_count: Option<u32>,
}

impl From<RawStatusReport> for StatusReport {
    fn from(raw: RawStatusReport) -> Self {
        Self {
            status: raw
                .current_status
                .as_deref()
                .map_or(GatewayStatus::Unknown(String::new()), GatewayStatus::from_wire),
            version: raw.version,
            locker_count: raw.lockers,
        }
    }
}

/// Parsed result of `POST /locker_status`.
///
/// All fields are optional on the wire; older firmware omits anything
/// it can't measure.
#[derive(Debug, Clone, Deserialize)]
pub struct LockerStatusReport {
    /// `true` = bolt thrown (locked), `false` = retracted (unlocked).
    #[serde(default)]
    pub closed: Option<bool>,
    /// Raw battery telemetry, same scale as the cloud inventory value.
    #[serde(default)]
    pub battery: Option<f64>,
    /// Radio signal strength between gateway and lock.
    #[serde(default)]
    pub rssi: Option<i64>,
    /// Lock firmware version.
    #[serde(default)]
    pub version: Option<u64>,
}
