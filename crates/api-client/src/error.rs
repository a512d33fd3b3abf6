//! Error types for client requests

use std::fmt;

use session_auth::RefreshError;
use transport::TransportError;

use crate::guard::{Classification, response_message};

/// A non-2xx response the pipeline did not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: u16,
    /// Raw response body
    pub body: String,
    /// Envelope message, or the raw body when it is not an envelope
    pub message: String,
    /// How the session guard classified this response
    pub classification: Classification,
}

impl HttpError {
    pub fn new(status: u16, body: String, classification: Classification) -> Self {
        let message = response_message(&body);
        Self {
            status,
            body,
            message,
            classification,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

/// Errors from `ApiClient` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Http(HttpError),

    /// A 401 whose refresh failed. Carries the original response and the refresh failure.
    #[error("{original} (token refresh failed: {source})")]
    RefreshFailed {
        original: HttpError,
        source: RefreshError,
    },

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(e) => Some(e.status),
            Error::RefreshFailed { original, .. } => Some(original.status),
            _ => None,
        }
    }

    pub fn classification(&self) -> Option<Classification> {
        match self {
            Error::Http(e) => Some(e.classification),
            Error::RefreshFailed { original, .. } => Some(original.classification),
            _ => None,
        }
    }

    /// Whether this failure also ended the session.
    pub fn is_session_terminal(&self) -> bool {
        match self {
            Error::Http(e) => e.classification.terminates_session(),
            Error::RefreshFailed { .. } => true,
            _ => false,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
