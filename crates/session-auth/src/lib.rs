//! Session credentials for the tutoring marketplace API
//!
//! Holds the access/refresh token pair and speaks the authentication
//! service's wire contract. This crate has no knowledge of how ordinary API
//! requests are made; `api-client` builds the retrying transport on top.
//!
//! Session lifecycle:
//! 1. `otp::request_code()` emails a one-time code to the user
//! 2. `otp::verify_code()` trades the code for a `TokenPair`
//! 3. The pair is written into a `TokenStore` (optionally file-backed)
//! 4. On a 401, `token::refresh_tokens()` mints a new pair from the refresh token
//! 5. Logout or terminal refresh failure calls `TokenStore::clear()`

pub mod constants;
pub mod error;
pub mod otp;
pub mod store;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use otp::{normalize_email, request_code, verify_code};
pub use store::TokenStore;
pub use token::{TokenPair, decode_refresh_response, refresh_tokens};
