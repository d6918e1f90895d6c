// thekeys-api: Async Rust client for The Keys cloud API and local gateway protocol

pub mod address;
pub mod cloud;
pub mod error;
pub mod gateway;
pub mod rate_limit;
pub mod transport;

pub use address::GatewayAddress;
pub use cloud::CloudClient;
pub use error::Error;
pub use gateway::{GatewayClient, GatewayStatus};
pub use rate_limit::{RateLimiter, Tier};
