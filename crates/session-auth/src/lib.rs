//! Session credentials and token refresh for the job portal API
//!
//! Provides the access token holder (`CredentialSource`) and the single
//! refresh endpoint call. This crate knows nothing about retries or
//! concurrency; the client crate layers single-flight refresh and session
//! termination on top.
//!
//! Token lifecycle:
//! 1. Shell logs in and installs the access token in a `CredentialSource`
//! 2. Pipeline reads it before every request
//! 3. On expiry, `token::refresh_access_token()` fetches a replacement
//! 4. Refreshed token is written back to the same `CredentialSource`
//! 5. On logout or unrecoverable failure the source is cleared

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialSource, FnCredentialSource, MemoryCredentialSource};
pub use error::{RefreshError, Result};
pub use token::{build_refresh_request, extract_token, refresh_access_token};
