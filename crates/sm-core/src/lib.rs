//! sm-core: shared types for the SM gateway
//!
//! Everything the other gateway crates agree on lives here:
//! - [`BackendKind`] - the closed set of backend services
//! - [`ErrorKind`] - the client-visible failure taxonomy
//! - [`GatewayError`] - startup / construction failures
//! - [`GatewayConfig`] - immutable configuration loaded once at startup

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AutomationCredentials, GatewayConfig, Secret, ServerSettings, SharedMemorySettings,
    SourceHostCredentials, TaskTrackerCredentials, TimeoutSettings, VoiceCredentials,
    WarehouseCredentials,
};
pub use error::{ErrorKind, GatewayError, Result};
pub use types::{BackendKind, TransportKind};

/// Gateway name reported to clients and in status output
pub const GATEWAY_NAME: &str = "sovereign-mind-gateway";

/// Gateway version
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{BackendKind, ErrorKind, GatewayConfig, GatewayError, TransportKind};
}
