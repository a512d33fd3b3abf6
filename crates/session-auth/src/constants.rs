//! Session endpoint constants
//!
//! Defaults for the refresh endpoint. The path is overridable through
//! `ClientConfig::refresh_path`; the header values are fixed.

/// Refresh endpoint path, relative to the API base URL. The refresh token
/// itself travels in an HTTP-only cookie managed by the transport.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Scheme prefix for the Authorization header
pub const BEARER_PREFIX: &str = "Bearer ";

/// Cache directives sent on the refresh call so no intermediary serves a
/// stale token response.
pub const NO_CACHE: &str = "no-cache";
