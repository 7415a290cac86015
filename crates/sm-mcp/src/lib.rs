//! sm-mcp: MCP front end of the SM gateway
//!
//! Architecture:
//! client → transport (streaming HTTP or SSE push) → session → dispatcher
//! → backend connector → session → transport → client
//!
//! Methods:
//! - initialize → handshake
//! - ping
//! - tools/list → the static tool catalog
//! - tools/call → dispatched to the owning backend

pub mod catalog;
pub mod dispatcher;
pub mod health;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use catalog::builtin_registry;
pub use dispatcher::{Dispatcher, ToolCallRequest, ToolCallResult, ToolError};
pub use health::{HealthReporter, HealthStatus, StatusConnector};
pub use protocol::{JsonRpcError, McpRequest, McpResponse};
pub use registry::{ParamSpec, ParamType, ToolAnnotations, ToolDescriptor, ToolRegistry};
pub use server::{Gateway, Outcome};
pub use session::{CloseReason, Session, SessionError, SessionManager, SessionState};
pub use transport::{router, serve, PushTransport, StreamingTransport, Transport};

/// MCP protocol revision spoken by the gateway
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Header carrying the streaming transport's session id
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{Gateway, McpRequest, McpResponse, ToolRegistry};
}
