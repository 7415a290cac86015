//! Error types for the SM gateway

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Client-visible failure taxonomy.
///
/// Every failed tool call surfaces exactly one of these together with a
/// human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownTool,
    InvalidArguments,
    BackendTimeout,
    BackendAuthFailed,
    BackendRateLimited,
    BackendRemoteError,
    BackendMalformedResponse,
    SessionClosed,
    ConfigurationMissing,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::BackendTimeout => "BackendTimeout",
            ErrorKind::BackendAuthFailed => "BackendAuthFailed",
            ErrorKind::BackendRateLimited => "BackendRateLimited",
            ErrorKind::BackendRemoteError => "BackendRemoteError",
            ErrorKind::BackendMalformedResponse => "BackendMalformedResponse",
            ErrorKind::SessionClosed => "SessionClosed",
            ErrorKind::ConfigurationMissing => "ConfigurationMissing",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Startup and registry errors.
///
/// `DuplicateToolName` and `Config` abort startup. A registry miss is
/// mapped to `UnknownTool` before it reaches a client.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Duplicate tool name: {0}")]
    DuplicateToolName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::Config(msg.into())
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}
