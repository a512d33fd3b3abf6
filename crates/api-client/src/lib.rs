//! Authenticated HTTP access layer for the job portal API
//!
//! Every API call goes through one `ApiClient`, which attaches the current
//! access token, classifies failures with the `SessionGuard`, refreshes an
//! expired token at most once per refresh cycle no matter how many requests
//! hit the expiry together, and ends the session when recovery is impossible.
//!
//! Request lifecycle:
//! 1. Caller issues `request()` → bearer token read fresh and attached
//! 2. 2xx → response returned unchanged
//! 3. 401 (expired) → join or start the single refresh, replay once with the new token
//! 4. 401 again after replay → returned to the caller, no further refresh
//! 5. 403 blocked / invalid refresh token / refresh failure → credentials cleared,
//!    termination handler notified once, error returned
//! 6. Anything else → returned to the caller unchanged

pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod refresh;
pub mod termination;

#[cfg(test)]
mod test_support;

pub use client::{ApiClient, ApiClientBuilder, REQUEST_ID_HEADER, RequestOptions};
pub use config::ClientConfig;
pub use error::{Error, HttpError, Result};
pub use guard::{Classification, RequestAttempt, SessionGuard};
pub use refresh::{RefreshCoordinator, RefreshPhase};
pub use termination::{SessionTermination, SessionTerminationHandler, TerminationReason};
