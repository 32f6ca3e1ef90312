//! Tutor API command-line client
//!
//! Signs in with an emailed one-time code, keeps the session in a token file,
//! and sends authenticated requests through `api_client::ApiClient`, which
//! refreshes an expired session once and retries.

mod commands;
mod config;
mod error;

use std::sync::Arc;

use anyhow::{Context, Result};
use api_client::{ApiClient, ClientConfig};
use reqwest::Method;
use session_auth::TokenStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Command;
use crate::config::Config;
use crate::error::Error;

const USAGE: &str = "\
usage: tutor-api [--config PATH] <command>

commands:
  login <email>                      email a one-time sign-in code
  verify <email> <code>              sign in with the code
  me                                 show the signed-in user
  logout                             forget the stored session
  status                             show whether a session is held
  request <METHOD> <target> [body]   send an authenticated request";

/// Arguments after the program name.
#[derive(Debug, PartialEq, Eq)]
struct Args {
    config: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> std::result::Result<Args, Error> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = Some(iter.next().ok_or(Error::MissingArgument("path"))?.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let (&name, params) = rest.split_first().ok_or(Error::NoCommand)?;
    let mut params = params.iter().map(|s| s.to_string());

    let command = match name {
        "login" => Command::Login {
            email: required(&mut params, "email")?,
        },
        "verify" => Command::Verify {
            email: required(&mut params, "email")?,
            code: required(&mut params, "code")?,
        },
        "me" => Command::Me,
        "logout" => Command::Logout,
        "status" => Command::Status,
        "request" => {
            let raw = required(&mut params, "method")?;
            let method = Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
                .map_err(|_| Error::InvalidMethod(raw.clone()))?;
            Command::Request {
                method,
                target: required(&mut params, "target")?,
                body: params.next(),
            }
        }
        other => return Err(Error::UnknownCommand(other.to_string())),
    };

    if let Some(extra) = params.next() {
        return Err(Error::UnexpectedArgument(extra));
    }

    Ok(Args { config, command })
}

fn required(
    params: &mut impl Iterator<Item = String>,
    what: &'static str,
) -> std::result::Result<String, Error> {
    params.next().ok_or(Error::MissingArgument(what))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config_path = Config::resolve_path(args.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .context("failed to build HTTP client")?;

    let tokens = match &config.session.token_file {
        Some(path) => TokenStore::load(path.clone()).await,
        None => {
            warn!("no session.token_file configured, session will not outlive this run");
            TokenStore::in_memory()
        }
    };

    let client = ApiClient::new(
        ClientConfig::new(&config.api.base_url).with_timeout(config.timeout()),
        http,
        Arc::new(tokens),
    );
    client.set_unauthorized_handler(|reason| {
        warn!(reason = %reason, "session expired, sign in again with `tutor-api login`");
    });

    let code = {
        let mut stdout = std::io::stdout().lock();
        commands::run(&client, args.command, &mut stdout).await?
    };
    std::process::exit(code);
}
