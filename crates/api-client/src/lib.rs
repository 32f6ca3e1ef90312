//! Session-aware HTTP client for the tutoring marketplace API
//!
//! Wraps `reqwest` with the behaviour every API call needs: the session's
//! bearer token is attached automatically, an expired token is refreshed
//! once (shared by all concurrent requests) and the request retried once,
//! and an unrecoverable session is reported through a single handler.
//!
//! Request outcomes:
//! 1. Non-401 response → returned unchanged, no refresh
//! 2. 401, refresh succeeds → request retried once, retry's response returned
//! 3. 401, refresh fails → tokens cleared, handler notified, original 401 returned
//! 4. Transport failure → `Err(Error::Transport)`, nothing retried
//!
//! Auth failures surface as responses and are checked like any other status;
//! only transport failures are errors.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod options;
mod refresh;

pub use client::{ApiClient, ClientConfig, UnauthorizedHandler};
pub use endpoint::resolve_url;
pub use error::{Error, RefreshError, Result};
pub use options::{Body, MultipartForm, RequestOptions};
pub use refresh::RefreshOutcome;
pub use tokio_util::sync::CancellationToken;
