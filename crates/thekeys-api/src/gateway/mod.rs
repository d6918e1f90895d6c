// Local gateway surface: the plain-HTTP protocol spoken by the
// gateway device firmware on the LAN.

pub mod client;
pub mod models;

pub use client::GatewayClient;
pub use models::{GatewayStatus, LockerStatusReport, StatusReport};
