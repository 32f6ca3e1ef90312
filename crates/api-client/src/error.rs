//! Error types for request execution
//!
//! A terminal authentication failure (401 whose refresh fails) is NOT an
//! error here: `ApiClient::request` returns the original 401 response so
//! callers branch on status codes uniformly. Only failures that produce no
//! response at all surface as `Error`.

pub use session_auth::Error as RefreshError;

/// Errors from executing a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection, DNS, TLS or timeout failure from the HTTP transport.
    /// Never retried by the client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller's timeout ran out while waiting for the session refresh.
    #[error("timed out after {0:?} waiting for session refresh")]
    TimedOut(std::time::Duration),

    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the request gave up because its timeout ran out.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_timeout(),
            Error::TimedOut(_) => true,
            _ => false,
        }
    }
}

/// Result alias for request execution.
pub type Result<T> = std::result::Result<T, Error>;
