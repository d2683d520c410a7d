//! Error types for Keyscope

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for Keyscope operations.
///
/// Every variant maps to a stable code (see [`KeyscopeError::code`]) so that
/// callers across the IPC boundary can branch on the failure without parsing
/// messages. Capacity limits are not errors; see [`crate::CapReason`].
#[derive(Error, Debug)]
pub enum KeyscopeError {
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("TLS certificate rejected: {0}")]
    TlsCertInvalid(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Connection is busy: a previous command did not finish reading its reply")]
    ConnectionBusy,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid {command} response: {message}")]
    InvalidResponse {
        command: &'static str,
        message: String,
    },

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl KeyscopeError {
    /// Build an `INVALID_<COMMAND>_RESPONSE` error.
    pub fn invalid_response(command: &'static str, message: impl Into<String>) -> Self {
        KeyscopeError::InvalidResponse {
            command,
            message: message.into(),
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            KeyscopeError::Timeout(_) => "TIMEOUT",
            KeyscopeError::ConnectionRefused(_) => "CONNECTION_REFUSED",
            KeyscopeError::AuthFailed(_) => "AUTH_FAILED",
            KeyscopeError::TlsCertInvalid(_) => "TLS_CERT_INVALID",
            KeyscopeError::Connection(_) => "CONNECTION_FAILED",
            KeyscopeError::ConnectionClosed => "CONNECTION_CLOSED",
            KeyscopeError::ConnectionBusy => "CONNECTION_BUSY",
            KeyscopeError::Protocol(_) => "PROTOCOL_ERROR",
            KeyscopeError::InvalidResponse { command, .. } => invalid_response_code(command),
            KeyscopeError::CommandFailed(_) => "COMMAND_FAILED",
            KeyscopeError::InvalidKey(_) => "INVALID_KEY",
            KeyscopeError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether the error is a connection-level failure.
    ///
    /// These are never retried by the engine; the caller decides whether to
    /// reconnect. Reply-shape and validation errors only abort the current
    /// job.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            KeyscopeError::Timeout(_)
                | KeyscopeError::ConnectionRefused(_)
                | KeyscopeError::AuthFailed(_)
                | KeyscopeError::TlsCertInvalid(_)
                | KeyscopeError::Connection(_)
                | KeyscopeError::ConnectionClosed
                | KeyscopeError::ConnectionBusy
        )
    }
}

fn invalid_response_code(command: &str) -> &'static str {
    match command {
        "SCAN" => "INVALID_SCAN_RESPONSE",
        "TYPE" => "INVALID_TYPE_RESPONSE",
        "TTL" => "INVALID_TTL_RESPONSE",
        "GET" => "INVALID_GET_RESPONSE",
        "HLEN" => "INVALID_HLEN_RESPONSE",
        "HSCAN" => "INVALID_HSCAN_RESPONSE",
        "LLEN" => "INVALID_LLEN_RESPONSE",
        "LRANGE" => "INVALID_LRANGE_RESPONSE",
        "SCARD" => "INVALID_SCARD_RESPONSE",
        "SSCAN" => "INVALID_SSCAN_RESPONSE",
        "ZCARD" => "INVALID_ZCARD_RESPONSE",
        "ZSCAN" => "INVALID_ZSCAN_RESPONSE",
        "XLEN" => "INVALID_XLEN_RESPONSE",
        "XREVRANGE" => "INVALID_XREVRANGE_RESPONSE",
        "PING" => "INVALID_PING_RESPONSE",
        "version" => "INVALID_VERSION_RESPONSE",
        "stats" => "INVALID_STATS_RESPONSE",
        _ => "INVALID_RESPONSE",
    }
}

impl From<std::io::Error> for KeyscopeError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => KeyscopeError::ConnectionRefused(err.to_string()),
            ErrorKind::TimedOut => KeyscopeError::Timeout(err.to_string()),
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                KeyscopeError::Connection(format!("connection closed by peer: {}", err))
            }
            _ => KeyscopeError::Connection(err.to_string()),
        }
    }
}

/// Result type alias for Keyscope operations
pub type Result<T> = std::result::Result<T, KeyscopeError>;

/// Serializable error payload carried by job events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code, e.g. `INVALID_SCAN_RESPONSE`
    pub code: String,
    /// Human readable message
    pub message: String,
}

impl From<&KeyscopeError> for ErrorInfo {
    fn from(err: &KeyscopeError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<KeyscopeError> for ErrorInfo {
    fn from(err: KeyscopeError) -> Self {
        Self::from(&err)
    }
}
