// Cloud API surface: authentication and device inventory.

pub mod client;
pub mod models;

pub use client::CloudClient;
pub use models::{GatewayInfo, LockerInfo, Share};
