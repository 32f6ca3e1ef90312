//! Token refresh against the authentication service
//!
//! `POST /api/v1/auth/refresh` with `{"refreshToken": "..."}`. A successful
//! response carries the new access token as `token` and optionally a rotated
//! `refreshToken`, either at the top level or wrapped in a `data` object.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A credential pair returned by the authentication service.
///
/// `refresh_token` is `None` when the service did not rotate it; callers must
/// keep the refresh token they already hold in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct TokenFields {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "refreshToken")]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshEnvelope {
    #[serde(default)]
    data: Option<TokenFields>,
    #[serde(flatten)]
    top: TokenFields,
}

impl TokenFields {
    fn into_pair(self) -> Option<TokenPair> {
        let access_token = Secret::non_empty(self.token?)?;
        Some(TokenPair {
            access_token,
            refresh_token: self.refresh_token.and_then(Secret::non_empty),
        })
    }
}

/// Decode a refresh response body.
///
/// The `data` wrapper wins when it carries a token; otherwise the top level is
/// used. A body with no non-empty `token` in either place is `Malformed` rather
/// than a pair with a blank access token.
pub fn decode_refresh_response(body: &[u8]) -> Result<TokenPair> {
    let envelope: RefreshEnvelope = serde_json::from_slice(body)
        .map_err(|e| Error::Malformed(format!("invalid refresh response: {e}")))?;

    let RefreshEnvelope { data, top } = envelope;
    if let Some(pair) = data.and_then(TokenFields::into_pair) {
        return Ok(pair);
    }
    top.into_pair()
        .ok_or_else(|| Error::Malformed("refresh response missing token".into()))
}

/// Exchange a refresh token for a new credential pair.
///
/// Makes exactly one request. Any non-2xx status is `Rejected`; the caller
/// decides what a failed refresh means for the session.
pub async fn refresh_tokens(
    client: &reqwest::Client,
    url: &str,
    refresh: &Secret<String>,
) -> Result<TokenPair> {
    let response = client
        .post(url)
        .json(&RefreshRequest {
            refresh_token: refresh.expose(),
        })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: format!("refresh failed: {body}"),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Http(format!("reading refresh response: {e}")))?;
    decode_refresh_response(&body)
}
