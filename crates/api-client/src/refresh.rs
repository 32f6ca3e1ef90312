//! Single-flight session refresh
//!
//! At most one refresh exchange is in flight per client. The first request to
//! need a refresh spawns it and parks a shared handle in `in_flight`; every
//! request that needs a refresh before it settles awaits that same handle.
//! The spawned task clears the slot when it finishes, so the next 401 starts
//! a fresh exchange instead of reusing a settled outcome.
//!
//! The exchange runs in its own task: a waiter that is cancelled or times out
//! drops only its clone of the handle, never the refresh itself.

use std::sync::Arc;

use common::Secret;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use session_auth::TokenStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::RefreshError;

/// Outcome shared with every waiter: the new access token or why there is none.
pub type RefreshOutcome = Result<Secret<String>, RefreshError>;

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

pub(crate) struct RefreshCoordinator {
    http: reqwest::Client,
    refresh_url: String,
    tokens: Arc<TokenStore>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
}

impl RefreshCoordinator {
    pub(crate) fn new(http: reqwest::Client, refresh_url: String, tokens: Arc<TokenStore>) -> Self {
        Self {
            http,
            refresh_url,
            tokens,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Refresh the session, joining an exchange already in flight if there is one.
    ///
    /// Fails immediately with `NoRefreshToken`, without touching the network,
    /// when the store has no refresh token.
    pub(crate) async fn refresh(&self) -> RefreshOutcome {
        let handle = {
            // Held across the check and the spawn so two callers cannot both
            // see an empty slot.
            let mut slot = self.in_flight.lock().await;
            match slot.clone() {
                Some(existing) => {
                    debug!("joining in-flight session refresh");
                    existing
                }
                None => {
                    let Some(refresh_token) = self.tokens.refresh_token().await else {
                        return Err(RefreshError::NoRefreshToken);
                    };
                    let handle = self.spawn_exchange(refresh_token);
                    *slot = Some(handle.clone());
                    handle
                }
            }
        };
        handle.await
    }

    #[cfg(test)]
    pub(crate) async fn is_in_flight(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    fn spawn_exchange(&self, refresh_token: Secret<String>) -> InFlight {
        let http = self.http.clone();
        let url = self.refresh_url.clone();
        let tokens = self.tokens.clone();
        let slot = self.in_flight.clone();

        let task = tokio::spawn(async move {
            let outcome = exchange(&http, &url, &tokens, &refresh_token).await;
            // The spawner still holds the slot lock until the handle is
            // parked, so this cannot clear the slot before it is filled.
            slot.lock().await.take();
            outcome
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(RefreshError::Http(format!("session refresh task failed: {e}")))
            })
        }
        .boxed()
        .shared()
    }
}

async fn exchange(
    http: &reqwest::Client,
    url: &str,
    tokens: &TokenStore,
    refresh_token: &Secret<String>,
) -> RefreshOutcome {
    match session_auth::refresh_tokens(http, url, refresh_token).await {
        Ok(pair) => {
            let access = pair.access_token.clone();
            let rotated = pair.refresh_token.is_some();
            tokens.set_tokens(pair.access_token, pair.refresh_token).await;
            crate::metrics::record_refresh(true);
            info!(rotated_refresh = rotated, "session refreshed");
            Ok(access)
        }
        Err(e) => {
            crate::metrics::record_refresh(false);
            warn!(error = %e, "session refresh failed");
            Err(e)
        }
    }
}
