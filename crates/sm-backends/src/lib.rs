//! sm-backends: authenticated connectors for the services behind the gateway
//!
//! One [`BackendConnector`] per [`sm_core::BackendKind`]. REST connectors
//! share [`http::ApiClient`]; the Hive Mind connector runs its statements
//! through the warehouse connector.

pub mod args;
pub mod automation;
pub mod connector;
pub mod error;
pub mod http;
pub mod shared_memory;
pub mod source_host;
pub mod task_tracker;
pub mod voice;
pub mod warehouse;

pub use args::Arguments;
pub use automation::AutomationConnector;
pub use connector::{BackendConnector, BoxedConnector, ConnectorSet, DisabledConnector};
pub use error::{BackendError, BackendErrorKind};
pub use shared_memory::SharedMemoryConnector;
pub use source_host::SourceHostConnector;
pub use task_tracker::TaskTrackerConnector;
pub use voice::VoiceConnector;
pub use warehouse::WarehouseConnector;
