//! Client configuration
//!
//! Deserialized from the `[client]` table of the shell's TOML file. Only
//! `base_url` is required; everything else has a default that matches the
//! API's conventions.

use std::time::Duration;

use serde::Deserialize;
use session_auth::DEFAULT_REFRESH_PATH;

/// Settings for one `ApiClient` instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Refresh endpoint path; exempt from bearer attachment and from
    /// refresh-triggering classification
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Case-insensitive substrings that mark a 403 as a blocked account
    #[serde(default = "default_blocked_patterns")]
    pub blocked_patterns: Vec<String>,
    /// Case-insensitive substrings that mark a 401 as a dead refresh token
    #[serde(default = "default_invalid_refresh_patterns")]
    pub invalid_refresh_patterns: Vec<String>,
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_blocked_patterns() -> Vec<String> {
    vec!["blocked".to_string()]
}

fn default_invalid_refresh_patterns() -> Vec<String> {
    vec!["invalid refresh token".to_string()]
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: default_refresh_path(),
            timeout_secs: default_timeout(),
            blocked_patterns: default_blocked_patterns(),
            invalid_refresh_patterns: default_invalid_refresh_patterns(),
        }
    }

    /// Reject values the client cannot operate with.
    pub fn validate(&self) -> common::Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        if !self.refresh_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "refresh_path must start with '/', got: {}",
                self.refresh_path
            )));
        }
        if self.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Join a request path onto the base URL. Absolute URLs pass through;
    /// the pipeline refuses those outside the base URL.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn refresh_url(&self) -> String {
        self.resolve_url(&self.refresh_path)
    }

    /// Whether `url` lies under the base URL (same scheme, host and base path).
    pub fn is_api_url(&self, url: &str) -> bool {
        let base = self.base_url.trim_end_matches('/');
        match url.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
            None => false,
        }
    }

    /// Whether `url` is exactly the refresh endpoint (query, fragment and
    /// trailing slash ignored).
    pub fn is_refresh_endpoint(&self, url: &str) -> bool {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        path.trim_end_matches('/') == self.refresh_url().trim_end_matches('/')
    }
}
