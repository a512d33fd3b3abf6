//! Error types for token refresh operations

/// Errors from the refresh endpoint call.
///
/// `Clone` because one failed refresh is delivered to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh response carried no access token")]
    MissingToken,

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    /// The task driving the refresh panicked or was cancelled
    #[error("refresh did not complete: {0}")]
    Interrupted(String),
}

/// Result alias for refresh operations.
pub type Result<T> = std::result::Result<T, RefreshError>;
