//! Error types for backend-link.
//!
//! [`LinkError`] is returned synchronously by the public API (bad input,
//! invalid state, configuration problems) and carried inside resolved
//! [`ReplyHandle`](crate::ReplyHandle)s and connection error notifications.

use std::fmt;

use thiserror::Error;
use tokio_tungstenite::tungstenite::error::Error as WsError;

/// Main error type for all backend-link operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Caller input rejected before any I/O (empty object type, missing id).
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// Connection refused, reset or timed out at the transport level.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Credentials were rejected during the handshake.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Backend reported a 4xx status.
    #[error("Client error ({status_code}): {message}")]
    ClientError { status_code: u16, message: String },

    /// Backend reported a 5xx status.
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// Response body is not a valid JSON document.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Notification frame could not be decoded.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Unexpected frame sequence on the notification channel.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Operation is not valid in the current connection state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl LinkError {
    /// Classify this error for a reply handle.
    ///
    /// Errors without a per-reply counterpart (configuration, state) are
    /// reported as transport failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::ClientError { .. }
            | LinkError::EncodingError(_)
            | LinkError::AuthenticationError(_) => ErrorKind::ClientError,
            LinkError::ServerError { .. } => ErrorKind::ServerError,
            LinkError::MalformedResponse(_) | LinkError::MalformedMessage(_) => {
                ErrorKind::MalformedResponse
            },
            _ => ErrorKind::TransportError,
        }
    }
}

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LinkError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            LinkError::MalformedResponse(err.to_string())
        } else {
            LinkError::TransportError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::MalformedMessage(err.to_string())
    }
}

impl From<WsError> for LinkError {
    fn from(err: WsError) -> Self {
        LinkError::TransportError(err.to_string())
    }
}

/// Classified failure of a single reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 4xx-equivalent status from the backend.
    ClientError,
    /// 5xx-equivalent status from the backend.
    ServerError,
    /// Body is not a valid structured document.
    MalformedResponse,
    /// The request never produced a response (refused, reset, timeout, teardown).
    TransportError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ClientError => "client_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::TransportError => "transport_error",
        };
        f.write_str(name)
    }
}

/// Result type alias using [`LinkError`].
pub type Result<T> = std::result::Result<T, LinkError>;
