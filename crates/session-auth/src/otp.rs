//! Email one-time-code login
//!
//! Two calls to the authentication service: request a code for an email
//! address, then verify the code the user received. Verification yields the
//! session's first `TokenPair`, which the caller writes into a `TokenStore`.

use common::Secret;
use serde::Serialize;
use tracing::{debug, info};

use crate::constants::{OTP_CODE_LENGTH, OTP_REQUEST_PATH, OTP_VERIFY_PATH};
use crate::error::{Error, Result};
use crate::token::TokenPair;

#[derive(Serialize)]
struct CodeRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    code: &'a str,
}

/// Canonical form of an email address as the service expects it.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("not an email address: {email}")))
    }
}

fn validate_code(code: &str) -> Result<()> {
    if code.len() == OTP_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "code must be {OTP_CODE_LENGTH} digits"
        )))
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Pull a human-readable reason out of an error body: `message`, then
/// `error`, then the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["message", "error"]
                .iter()
                .find_map(|key| json.get(key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| body.to_owned())
}

async fn post_json<T: Serialize>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
) -> Result<serde_json::Value> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Http(format!("request to {url} failed: {e}")))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading response from {url}: {e}")))?;

    if !status.is_success() {
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }

    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| Error::Malformed(format!("invalid JSON body: {e}")))
}

/// Ask the service to email a one-time code to `email`.
pub async fn request_code(client: &reqwest::Client, base_url: &str, email: &str) -> Result<()> {
    let email = normalize_email(email);
    validate_email(&email)?;

    post_json(
        client,
        &endpoint(base_url, OTP_REQUEST_PATH),
        &CodeRequest { email: &email },
    )
    .await?;
    info!("one-time code requested");
    Ok(())
}

/// Trade a one-time code for the session's credential pair.
///
/// The access token may appear as `token`, `accessToken` or `data.token`; the
/// refresh token as `refreshToken` or `data.refreshToken`. A success response
/// without an access token is `Malformed`.
pub async fn verify_code(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    code: &str,
) -> Result<TokenPair> {
    let email = normalize_email(email);
    validate_email(&email)?;
    let code = code.trim();
    validate_code(code)?;

    let json = post_json(
        client,
        &endpoint(base_url, OTP_VERIFY_PATH),
        &VerifyRequest {
            email: &email,
            code,
        },
    )
    .await?;

    let pair = pair_from_verify(&json)?;
    debug!(
        has_refresh = pair.refresh_token.is_some(),
        "one-time code verified"
    );
    Ok(pair)
}

fn pair_from_verify(json: &serde_json::Value) -> Result<TokenPair> {
    let field = |path: &[&str]| -> Option<Secret<String>> {
        let mut node = json;
        for key in path {
            node = node.get(key)?;
        }
        node.as_str().and_then(Secret::non_empty)
    };

    let access_token = field(&["token"])
        .or_else(|| field(&["accessToken"]))
        .or_else(|| field(&["data", "token"]))
        .ok_or_else(|| Error::Malformed("verify response missing token".into()))?;
    let refresh_token = field(&["refreshToken"]).or_else(|| field(&["data", "refreshToken"]));

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}
