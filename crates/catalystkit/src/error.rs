//! Error types for Catalyst Center client operations.
//!
//! Client errors are categorized the same way transport failures are: the
//! reconciliation core only sees [`TransportError`], so every client error
//! converts into one.

use declarative::{TransportError, TransportErrorKind};
use std::fmt;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad connection parameters.
    Config,
    /// Host unreachable, TLS failure, timeout.
    Network,
    /// Credentials rejected or token missing.
    Auth,
    /// The controller answered with something that is not the expected JSON.
    Format,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Config => "Invalid connection settings",
            Self::Network => "Network connectivity issue",
            Self::Auth => "Authentication failed",
            Self::Format => "Unexpected controller response",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors raised by the Catalyst Center client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection parameters failed validation.
    #[error("invalid connection settings: {0}")]
    InvalidConfig(String),

    /// HTTP request failed before a usable response arrived.
    #[error("HTTP request failed: {message}")]
    HttpError {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The token endpoint rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Invalid response from the controller.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::HttpError {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig(_) => ErrorCategory::Config,
            Error::HttpError { .. } => ErrorCategory::Network,
            Error::Auth(_) => ErrorCategory::Auth,
            Error::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::HttpError {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::HttpError {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<Error> for TransportError {
    fn from(err: Error) -> Self {
        match err {
            Error::HttpError {
                status: Some(status),
                message,
            } => {
                let mut error = TransportError::from_status(status, serde_json::Value::Null);
                error.message = message;
                error
            }
            Error::HttpError { message, .. } => {
                TransportError::new(TransportErrorKind::Network, message)
            }
            Error::Auth(message) => TransportError::new(TransportErrorKind::Auth, message),
            Error::InvalidConfig(message) => {
                TransportError::new(TransportErrorKind::Validation, message)
            }
            Error::InvalidResponse(message) => {
                TransportError::new(TransportErrorKind::Server, message)
            }
        }
    }
}
