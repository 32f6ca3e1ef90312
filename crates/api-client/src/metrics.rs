//! Session refresh metrics
//!
//! - `api_client_refresh_total` (counter): label `outcome` = `success` | `failure`
//! - `api_client_retries_total` (counter): requests re-sent after a refresh
//! - `api_client_terminal_unauthorized_total` (counter): 401s handed back to the
//!   caller because the session could not be refreshed

/// Record one completed refresh exchange with the auth service.
pub fn record_refresh(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("api_client_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request being re-sent with a refreshed token.
pub fn record_retry() {
    metrics::counter!("api_client_retries_total").increment(1);
}

/// Record a 401 returned to the caller after a failed refresh.
pub fn record_terminal_unauthorized() {
    metrics::counter!("api_client_terminal_unauthorized_total").increment(1);
}
