//! Authenticated request execution
//!
//! Every request goes out with the session's bearer token. A 401 triggers one
//! coordinated session refresh (see `refresh`) and one retry. When the refresh
//! fails the session is cleared, the unauthorized handler is told, and the
//! caller gets the original 401 back as an ordinary response.
//!
//! Transport failures are the only errors: they come back as `Err` and are
//! never retried here.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use session_auth::{REFRESH_PATH, TokenPair, TokenStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::endpoint::resolve_url;
use crate::error::{Error, RefreshError, Result};
use crate::options::{Body, RequestOptions};
use crate::refresh::RefreshCoordinator;

/// Callback run when a 401 cannot be recovered by refreshing the session.
pub type UnauthorizedHandler = Arc<dyn Fn(&RefreshError) + Send + Sync>;

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for relative request targets. Absolute targets ignore it.
    pub base_url: String,
    /// Default per-call timeout when a request does not set its own.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    timeout: Option<Duration>,
    tokens: Arc<TokenStore>,
    refresh: RefreshCoordinator,
    on_unauthorized: RwLock<Option<UnauthorizedHandler>>,
}

/// Session-aware HTTP client.
///
/// Cheap to clone; clones share the token store, the in-flight refresh and
/// the unauthorized handler. Build one per session and hand clones to
/// whatever needs to call the API.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .field("persistent_tokens", &self.inner.tokens.is_persistent())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig, http: reqwest::Client, tokens: Arc<TokenStore>) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_owned();
        let refresh_url = resolve_url(&base_url, REFRESH_PATH);
        let refresh = RefreshCoordinator::new(http.clone(), refresh_url, tokens.clone());
        Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                timeout: config.timeout,
                tokens,
                refresh,
                on_unauthorized: RwLock::new(None),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Underlying transport, for calls that must not carry the session token
    /// (e.g. one-time-code login).
    pub fn http_client(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    /// Seed the session after login.
    pub async fn set_tokens(&self, pair: TokenPair) {
        self.inner
            .tokens
            .set_tokens(pair.access_token, pair.refresh_token)
            .await;
    }

    /// End the session locally.
    pub async fn clear_tokens(&self) {
        self.inner.tokens.clear().await;
    }

    /// Register the handler for unrecoverable 401s, replacing any earlier one.
    pub fn set_unauthorized_handler<F>(&self, handler: F)
    where
        F: Fn(&RefreshError) + Send + Sync + 'static,
    {
        let mut slot = self
            .inner
            .on_unauthorized
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(handler));
    }

    pub fn clear_unauthorized_handler(&self) {
        let mut slot = self
            .inner
            .on_unauthorized
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    pub async fn get(&self, target: &str, options: RequestOptions) -> Result<Response> {
        self.request(target, options.method(Method::GET)).await
    }

    pub async fn delete(&self, target: &str, options: RequestOptions) -> Result<Response> {
        self.request(target, options.method(Method::DELETE)).await
    }

    pub async fn post(
        &self,
        target: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<Response> {
        let options = options.method(Method::POST).with_shaped_body(body.into());
        self.request(target, options).await
    }

    pub async fn put(
        &self,
        target: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<Response> {
        let options = options.method(Method::PUT).with_shaped_body(body.into());
        self.request(target, options).await
    }

    /// Send a request with the session's credentials.
    ///
    /// - Non-401 responses are returned as-is.
    /// - On 401 the session is refreshed (sharing any refresh already in
    ///   flight) and the request is sent exactly once more; whatever that
    ///   returns, 401 included, goes back to the caller.
    /// - If the refresh fails the token store is cleared, the unauthorized
    ///   handler runs, and the ORIGINAL 401 response is returned as `Ok`.
    ///
    /// Transport failures are `Err(Error::Transport)`. The per-call timeout
    /// bounds each HTTP call and the wait for the session refresh; running
    /// out while waiting yields `Err(Error::TimedOut)`. Cancelling
    /// `options.cancel` yields `Err(Error::Cancelled)` without stopping a
    /// refresh other requests may be waiting on.
    #[instrument(
        skip_all,
        fields(request_id = %uuid::Uuid::new_v4(), method = %options.method, url = tracing::field::Empty)
    )]
    pub async fn request(&self, target: &str, options: RequestOptions) -> Result<Response> {
        let url = resolve_url(&self.inner.base_url, target);
        tracing::Span::current().record("url", url.as_str());
        let cancel = options.cancel.clone();

        let first = until_cancelled(cancel.as_ref(), self.send(&url, &options)).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        debug!("received 401, refreshing session");
        let timeout = options.timeout.or(self.inner.timeout);
        let refreshed = async { Ok(self.inner.refresh.refresh().await) };
        match until_cancelled(cancel.as_ref(), within(timeout, refreshed)).await? {
            Ok(_) => {
                crate::metrics::record_retry();
                debug!("session refreshed, retrying request");
                until_cancelled(cancel.as_ref(), self.send(&url, &options)).await
            }
            Err(e) => {
                warn!(error = %e, "session could not be refreshed, signing out");
                self.inner.tokens.clear().await;
                crate::metrics::record_terminal_unauthorized();
                self.notify_unauthorized(&e);
                Ok(first)
            }
        }
    }

    async fn send(&self, url: &str, options: &RequestOptions) -> Result<Response> {
        let mut headers = options.headers.clone();
        if !headers.contains_key(AUTHORIZATION) {
            if let Some(token) = self.inner.tokens.access_token().await {
                headers.insert(AUTHORIZATION, bearer(&token)?);
            }
        }

        let mut builder = self
            .inner
            .http
            .request(options.method.clone(), url)
            .headers(headers);
        if let Some(timeout) = options.timeout.or(self.inner.timeout) {
            builder = builder.timeout(timeout);
        }
        let builder = options.body.apply(builder)?;

        let response = builder.send().await?;
        debug!(status = response.status().as_u16(), "response received");
        Ok(response)
    }

    fn notify_unauthorized(&self, error: &RefreshError) {
        let handler = self
            .inner
            .on_unauthorized
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }

    #[cfg(test)]
    async fn refresh_in_flight(&self) -> bool {
        self.inner.refresh.is_in_flight().await
    }
}

fn bearer(token: &Secret<String>) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
        .map_err(|e| Error::InvalidRequest(format!("access token is not a valid header value: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Bound `fut` by the caller's timeout, if any. Expiry drops only this
/// caller's wait; a shared refresh keeps running in its own task.
async fn within<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::TimedOut(limit))?,
        None => fut.await,
    }
}

/// Race `fut` against the caller's cancellation token, if any. Losing the race
/// drops `fut`, which aborts an HTTP call or abandons a refresh wait.
async fn until_cancelled<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}
