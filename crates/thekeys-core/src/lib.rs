// thekeys-core: device orchestration and domain model for The Keys locks
//
// Layers on top of thekeys-api: translates wire errors into user-facing
// diagnostics, tracks gateway readiness before dispatching heavy lock
// commands, and exposes a host-agnostic snapshot of every lock's state.

pub mod battery;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;

pub use config::ClientConfig;
pub use error::CoreError;
pub use model::{Gateway, Lock, LockSnapshot, LockState};
pub use orchestrator::{Orchestrator, Readiness};

// Re-exported so hosts don't need a direct thekeys-api dependency for
// configuration.
pub use thekeys_api::{GatewayAddress, GatewayStatus};
