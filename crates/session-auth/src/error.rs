//! Error types for session authentication operations

/// Errors from token refresh and one-time-code login.
///
/// `Clone` because a single refresh outcome is handed to every request that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("no refresh token")]
    NoRefreshToken,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("rejected by auth service ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed auth response: {0}")]
    Malformed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
