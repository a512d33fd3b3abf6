//! Shared building blocks for the job portal API client crates:
//! the redacting `Secret` holder and the configuration error type.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
