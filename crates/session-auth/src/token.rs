//! Refresh endpoint call
//!
//! POSTs to the refresh endpoint without an Authorization header and with
//! cache bypass headers. The refresh token rides along in the transport's
//! cookie jar; this module never sees it.
//!
//! The new access token may arrive at the top level of the envelope or nested
//! under `data`. Both are checked, top level first.

use std::time::Duration;

use common::Secret;
use reqwest::Method;
use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};
use tracing::{debug, warn};
use transport::{ApiEnvelope, HttpRequest, Transport};

use crate::constants::NO_CACHE;
use crate::error::{RefreshError, Result};

/// Build the refresh request. Never carries a bearer token.
pub fn build_refresh_request(url: &str, timeout: Option<Duration>) -> HttpRequest {
    let mut request = HttpRequest::new(Method::POST, url);
    request
        .headers
        .insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    request
        .headers
        .insert(PRAGMA, HeaderValue::from_static(NO_CACHE));
    request.timeout = timeout;
    request
}

/// Pull the access token out of a refresh response envelope.
pub fn extract_token(envelope: &ApiEnvelope) -> Option<String> {
    if let Some(token) = envelope.token.as_deref().filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    envelope
        .data
        .as_ref()
        .and_then(|d| d.get("token"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Call the refresh endpoint once and return the new access token.
///
/// Exactly one network call per invocation; single-flight is the caller's job.
pub async fn refresh_access_token(
    transport: &dyn Transport,
    url: &str,
    timeout: Option<Duration>,
) -> Result<Secret<String>> {
    let response = transport
        .send(build_refresh_request(url, timeout))
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    let envelope = response.envelope();

    if !response.is_success() {
        let message = envelope
            .and_then(|e| e.message)
            .unwrap_or_else(|| response.text());
        warn!(status = response.status, %message, "refresh endpoint rejected request");
        return Err(RefreshError::Rejected {
            status: response.status,
            message,
        });
    }

    let envelope = envelope.ok_or_else(|| {
        RefreshError::InvalidResponse(format!(
            "expected JSON envelope, got {} bytes",
            response.body.len()
        ))
    })?;

    if !envelope.success {
        return Err(RefreshError::Rejected {
            status: response.status,
            message: envelope
                .message
                .unwrap_or_else(|| "success=false".to_string()),
        });
    }

    let token = extract_token(&envelope).ok_or(RefreshError::MissingToken)?;
    debug!("refresh endpoint issued new access token");
    Ok(Secret::new(token))
}
