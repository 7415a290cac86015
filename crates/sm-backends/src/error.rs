//! Connector-level errors
//!
//! Every connector reports failures through [`BackendError`]; the dispatcher
//! maps the kind onto the client-visible [`sm_core::ErrorKind`].

use serde::Serialize;
use sm_core::ErrorKind;
use std::fmt;
use thiserror::Error;

/// Longest remote error body echoed back in a message
const MAX_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackendErrorKind {
    /// The backend rejected our credentials (401/403)
    AuthFailed,
    /// The backend throttled us (429)
    RateLimited,
    /// Any other remote or network failure
    RemoteError,
    /// The backend answered with something we could not decode
    MalformedResponse,
    /// The HTTP client gave up waiting
    Timeout,
    /// The connector is disabled for lack of credentials
    NotConfigured,
    /// An argument failed the connector's own checks
    InvalidArgument,
    /// The connector has no such operation
    UnsupportedOperation,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendErrorKind::AuthFailed => "AuthFailed",
            BackendErrorKind::RateLimited => "RateLimited",
            BackendErrorKind::RemoteError => "RemoteError",
            BackendErrorKind::MalformedResponse => "MalformedResponse",
            BackendErrorKind::Timeout => "Timeout",
            BackendErrorKind::NotConfigured => "NotConfigured",
            BackendErrorKind::InvalidArgument => "InvalidArgument",
            BackendErrorKind::UnsupportedOperation => "UnsupportedOperation",
        };
        f.write_str(name)
    }
}

/// Uniform failure shape for every connector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::AuthFailed, msg)
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::RateLimited, msg)
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::RemoteError, msg)
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::MalformedResponse, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, msg)
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotConfigured, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidArgument, msg)
    }

    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            BackendErrorKind::UnsupportedOperation,
            format!("unsupported operation: {operation}"),
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(service: &str, status: u16, body: &str) -> Self {
        let message = format!("{service} HTTP {status}: {}", truncate(body));
        match status {
            401 | 403 => Self::auth_failed(message),
            429 => Self::rate_limited(message),
            _ => Self::remote(message),
        }
    }

    /// The taxonomy entry a client sees for this failure.
    pub fn client_kind(&self) -> ErrorKind {
        match self.kind {
            BackendErrorKind::AuthFailed => ErrorKind::BackendAuthFailed,
            BackendErrorKind::RateLimited => ErrorKind::BackendRateLimited,
            BackendErrorKind::RemoteError => ErrorKind::BackendRemoteError,
            BackendErrorKind::MalformedResponse => ErrorKind::BackendMalformedResponse,
            BackendErrorKind::Timeout => ErrorKind::BackendTimeout,
            BackendErrorKind::NotConfigured => ErrorKind::ConfigurationMissing,
            BackendErrorKind::InvalidArgument => ErrorKind::InvalidArguments,
            BackendErrorKind::UnsupportedOperation => ErrorKind::UnknownTool,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::timeout(err.to_string())
        } else if err.is_decode() {
            BackendError::malformed(err.to_string())
        } else {
            BackendError::remote(err.to_string())
        }
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        body.to_string()
    } else {
        body.chars().take(MAX_BODY_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            BackendError::from_status("asana", 401, "").kind,
            BackendErrorKind::AuthFailed
        );
        assert_eq!(
            BackendError::from_status("asana", 403, "").kind,
            BackendErrorKind::AuthFailed
        );
        assert_eq!(
            BackendError::from_status("github", 429, "").kind,
            BackendErrorKind::RateLimited
        );
        assert_eq!(
            BackendError::from_status("make", 502, "bad gateway").kind,
            BackendErrorKind::RemoteError
        );
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let err = BackendError::from_status("github", 500, &body);
        assert!(err.message.len() < 600);
        assert!(err.message.starts_with("github HTTP 500: "));
    }

    #[test]
    fn test_client_kind_mapping() {
        assert_eq!(
            BackendError::not_configured("x").client_kind(),
            ErrorKind::ConfigurationMissing
        );
        assert_eq!(
            BackendError::timeout("x").client_kind(),
            ErrorKind::BackendTimeout
        );
        assert_eq!(
            BackendError::malformed("x").client_kind(),
            ErrorKind::BackendMalformedResponse
        );
    }
}
