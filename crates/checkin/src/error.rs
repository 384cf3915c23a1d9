//! Error types for the check-in client crate.

use thiserror::Error;

/// Result type alias for check-in client operations.
pub type Result<T> = std::result::Result<T, CheckInError>;

/// Retry policy class for RPC failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcRetryClass {
    /// Network-layer failure (unavailable, deadline exceeded).
    Recoverable,
    /// Any other rejection.
    Fatal,
}

/// Errors that can occur while talking to the device lock backend.
#[derive(Debug, Error)]
pub enum CheckInError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx status returned by the backend
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Request could not be built (missing registration, bad header value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A 2xx reply that does not map onto the domain model
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl CheckInError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RpcRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                503 | 504 => RpcRetryClass::Recoverable,
                _ => RpcRetryClass::Fatal,
            },
            Self::Http(err) if err.is_timeout() || err.is_connect() || err.is_request() => {
                RpcRetryClass::Recoverable
            }
            Self::Http(_) => RpcRetryClass::Fatal,
            Self::Json(_) => RpcRetryClass::Fatal,
            Self::InvalidRequest(_) => RpcRetryClass::Fatal,
            Self::Protocol(_) => RpcRetryClass::Fatal,
        }
    }
}

impl From<CheckInError> for devicelock_core::Error {
    fn from(err: CheckInError) -> Self {
        match err {
            CheckInError::Protocol(message) => devicelock_core::Error::Protocol(message),
            other => devicelock_core::Error::Rpc(other.to_string()),
        }
    }
}
