//! Command execution
//!
//! Each command talks to the API through one shared `ApiClient`, so every
//! authenticated call gets the client's refresh-and-retry behaviour. Output
//! goes to the supplied writer; logs go to stderr via `tracing`.

use std::io::Write;

use anyhow::{Context, Result};
use api_client::{ApiClient, Body, RequestOptions};
use reqwest::Method;
use session_auth::ME_PATH;
use tracing::info;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Email a one-time code
    Login { email: String },
    /// Trade a one-time code for a session
    Verify { email: String, code: String },
    /// Show the signed-in user
    Me,
    /// Forget the session
    Logout,
    /// Report whether a session is held
    Status,
    /// Arbitrary authenticated request
    Request {
        method: Method,
        target: String,
        body: Option<String>,
    },
}

/// Run a command and return the process exit code: 0 on success, 1 when the
/// API answered with a non-success status.
pub async fn run(client: &ApiClient, command: Command, out: &mut impl Write) -> Result<i32> {
    match command {
        Command::Login { email } => {
            session_auth::request_code(client.http_client(), client.base_url(), &email)
                .await
                .context("requesting one-time code")?;
            writeln!(out, "Code sent to {}", session_auth::normalize_email(&email))?;
            Ok(0)
        }
        Command::Verify { email, code } => {
            let pair =
                session_auth::verify_code(client.http_client(), client.base_url(), &email, &code)
                    .await
                    .context("verifying one-time code")?;
            let has_refresh = pair.refresh_token.is_some();
            client.set_tokens(pair).await;
            info!(has_refresh, "signed in");
            writeln!(out, "Signed in")?;
            Ok(0)
        }
        Command::Me => {
            let response = client.get(ME_PATH, RequestOptions::new()).await?;
            print_response(response, out).await
        }
        Command::Logout => {
            client.clear_tokens().await;
            writeln!(out, "Signed out")?;
            Ok(0)
        }
        Command::Status => {
            let store = client.token_store();
            let signed_in = store.access_token().await.is_some();
            let can_refresh = store.refresh_token().await.is_some();
            writeln!(
                out,
                "signed_in={signed_in} can_refresh={can_refresh} persistent={}",
                store.is_persistent()
            )?;
            Ok(0)
        }
        Command::Request {
            method,
            target,
            body,
        } => {
            let body = body.map(parse_body).unwrap_or_default();
            let options = RequestOptions::new();
            let response = match method {
                Method::GET => client.get(&target, options).await?,
                Method::DELETE => client.delete(&target, options).await?,
                Method::POST => client.post(&target, body, options).await?,
                Method::PUT => client.put(&target, body, options).await?,
                other => {
                    client
                        .request(&target, options.method(other).with_shaped_body(body))
                        .await?
                }
            };
            print_response(response, out).await
        }
    }
}

/// JSON arguments are sent as JSON; anything else as plain text.
fn parse_body(raw: String) -> Body {
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => Body::Json(value),
        Err(_) => Body::Text(raw),
    }
}

async fn print_response(response: reqwest::Response, out: &mut impl Write) -> Result<i32> {
    let status = response.status();
    let text = response.text().await.context("reading response body")?;
    writeln!(out, "HTTP {}", status.as_u16())?;
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?,
        Err(_) if text.is_empty() => {}
        Err(_) => writeln!(out, "{text}")?,
    }
    Ok(if status.is_success() { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{any, get, post};
    use session_auth::TokenStore;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Mock API: code 123456 signs in as `at_1`/`rt_1`, `/api/v1/auth/me`
    /// requires `at_1`, `/echo` reports the method, content type and body it
    /// received.
    async fn start_api() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new()
                .route(
                    "/api/v1/auth/otp/request",
                    post(|| async { Json(serde_json::json!({"success": true})) }),
                )
                .route(
                    "/api/v1/auth/otp/verify",
                    post(|Json(req): Json<serde_json::Value>| async move {
                        if req["code"] == "123456" {
                            Json(serde_json::json!({"data": {"token": "at_1", "refreshToken": "rt_1"}}))
                                .into_response()
                        } else {
                            (StatusCode::BAD_REQUEST, r#"{"message":"invalid code"}"#).into_response()
                        }
                    }),
                )
                .route(
                    "/api/v1/auth/me",
                    get(|headers: HeaderMap| async move {
                        if headers.get("authorization").is_some_and(|v| v == "Bearer at_1") {
                            Json(serde_json::json!({"email": "student@example.com", "role": "student"}))
                                .into_response()
                        } else {
                            (StatusCode::UNAUTHORIZED, r#"{"message":"unauthorized"}"#).into_response()
                        }
                    }),
                )
                .route(
                    "/echo",
                    any(|method: axum::http::Method, headers: HeaderMap, body: String| async move {
                        let content_type = headers
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        Json(serde_json::json!({
                            "method": method.to_string(),
                            "content_type": content_type,
                            "body": body,
                        }))
                    }),
                );
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str, store: Arc<TokenStore>) -> ApiClient {
        ApiClient::new(
            api_client::ClientConfig::new(base),
            reqwest::Client::new(),
            store,
        )
    }

    async fn run_to_string(client: &ApiClient, command: Command) -> (i32, String) {
        let mut out = Vec::new();
        let code = run(client, command, &mut out).await.unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn verify_then_me_uses_stored_session() {
        let base = start_api().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let api = client(&base, Arc::new(TokenStore::load(path.clone()).await));

        let (code, out) = run_to_string(
            &api,
            Command::Verify {
                email: "Student@Example.com".into(),
                code: "123456".into(),
            },
        )
        .await;
        assert_eq!(code, 0);
        assert_eq!(out, "Signed in\n");

        // A fresh process picks the session up from disk
        let api = client(&base, Arc::new(TokenStore::load(path).await));
        let (code, out) = run_to_string(&api, Command::Me).await;
        assert_eq!(code, 0);
        assert!(out.starts_with("HTTP 200\n"), "{out}");
        assert!(out.contains("student@example.com"), "{out}");
    }

    #[tokio::test]
    async fn me_without_session_exits_nonzero() {
        let base = start_api().await;
        let api = client(&base, Arc::new(TokenStore::in_memory()));

        let (code, out) = run_to_string(&api, Command::Me).await;
        assert_eq!(code, 1);
        assert!(out.starts_with("HTTP 401\n"), "{out}");
    }

    #[tokio::test]
    async fn wrong_code_is_an_error() {
        let base = start_api().await;
        let api = client(&base, Arc::new(TokenStore::in_memory()));

        let mut out = Vec::new();
        let err = run(
            &api,
            Command::Verify {
                email: "student@example.com".into(),
                code: "000000".into(),
            },
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("invalid code"), "{err:#}");
        assert!(api.token_store().access_token().await.is_none());
    }

    #[tokio::test]
    async fn login_reports_normalized_email() {
        let base = start_api().await;
        let api = client(&base, Arc::new(TokenStore::in_memory()));

        let (code, out) = run_to_string(
            &api,
            Command::Login {
                email: " Tutor@Example.com ".into(),
            },
        )
        .await;
        assert_eq!(code, 0);
        assert_eq!(out, "Code sent to tutor@example.com\n");
    }

    #[tokio::test]
    async fn logout_and_status() {
        let base = start_api().await;
        let store = Arc::new(TokenStore::in_memory());
        let api = client(&base, store.clone());
        run_to_string(
            &api,
            Command::Verify {
                email: "student@example.com".into(),
                code: "123456".into(),
            },
        )
        .await;

        let (_, out) = run_to_string(&api, Command::Status).await;
        assert_eq!(out, "signed_in=true can_refresh=true persistent=false\n");

        let (code, _) = run_to_string(&api, Command::Logout).await;
        assert_eq!(code, 0);
        let (_, out) = run_to_string(&api, Command::Status).await;
        assert_eq!(out, "signed_in=false can_refresh=false persistent=false\n");
    }

    #[tokio::test]
    async fn request_sends_json_and_text_bodies() {
        let base = start_api().await;
        let api = client(&base, Arc::new(TokenStore::in_memory()));

        let (code, out) = run_to_string(
            &api,
            Command::Request {
                method: Method::POST,
                target: "/echo".into(),
                body: Some(r#"{"subject":"math"}"#.into()),
            },
        )
        .await;
        assert_eq!(code, 0);
        assert!(out.contains(r#""method": "POST""#), "{out}");
        assert!(out.contains("subject"), "{out}");

        assert!(out.contains(r#""content_type": "application/json""#), "{out}");

        let (_, out) = run_to_string(
            &api,
            Command::Request {
                method: Method::PATCH,
                target: "echo".into(),
                body: Some(r#"{"done":true}"#.into()),
            },
        )
        .await;
        assert!(out.contains(r#""method": "PATCH""#), "{out}");
        assert!(out.contains(r#""content_type": "application/json""#), "{out}");
        assert!(out.contains("done"), "{out}");

        let (_, out) = run_to_string(
            &api,
            Command::Request {
                method: Method::PATCH,
                target: "echo".into(),
                body: Some("plain words".into()),
            },
        )
        .await;
        assert!(out.contains("plain words"), "{out}");

        let (_, out) = run_to_string(
            &api,
            Command::Request {
                method: Method::OPTIONS,
                target: "echo".into(),
                body: None,
            },
        )
        .await;
        assert!(out.contains(r#""content_type": null"#), "{out}");
    }

    #[test]
    fn parse_body_detects_json() {
        assert!(matches!(parse_body(r#"{"a":1}"#.into()), Body::Json(_)));
        assert!(matches!(parse_body("hello".into()), Body::Text(_)));
    }
}
