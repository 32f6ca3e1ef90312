//! Shared primitives for the tutor-api workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
