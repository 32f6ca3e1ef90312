//! Command-line usage errors

use thiserror::Error;

/// Errors from parsing the command line. Reported with the usage text and
/// exit code 2; everything that happens after parsing goes through `anyhow`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("no command given")]
    NoCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing argument: <{0}>")]
    MissingArgument(&'static str),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
}
