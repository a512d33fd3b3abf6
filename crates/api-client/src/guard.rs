//! Session guard: classification of failed responses
//!
//! Decides, for one non-2xx response, whether the pipeline should refresh and
//! replay, terminate the session, or hand the error back unchanged. Terminal
//! conditions (blocked account, dead refresh token) are checked before the
//! generic 401 path so a refresh that is bound to fail is never attempted.

use transport::ApiEnvelope;

/// Outcome of classifying a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Not an auth failure this layer reacts to
    PassThrough,
    /// 401 on a first attempt: refresh, then replay once
    ExpiredToken,
    /// 401 on the replay: give up on this request only
    ExhaustedRetry,
    /// 403 with a blocked-account message: terminate the session
    BlockedAccount,
    /// 401 saying the refresh token is invalid: terminate the session
    UnrecoverableAuth,
}

impl Classification {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::PassThrough => "pass_through",
            Classification::ExpiredToken => "expired_token",
            Classification::ExhaustedRetry => "exhausted_retry",
            Classification::BlockedAccount => "blocked_account",
            Classification::UnrecoverableAuth => "unrecoverable_auth",
        }
    }

    /// Whether this outcome ends the whole session, not just the request.
    pub fn terminates_session(&self) -> bool {
        matches!(
            self,
            Classification::BlockedAccount | Classification::UnrecoverableAuth
        )
    }
}

/// Per-request retry bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestAttempt {
    /// Set once the request has been replayed after an auth failure
    pub already_retried: bool,
    /// Request targets the refresh endpoint; a 401 there never triggers a refresh
    pub refresh_exempt: bool,
}

impl RequestAttempt {
    pub fn new(refresh_exempt: bool) -> Self {
        Self {
            already_retried: false,
            refresh_exempt,
        }
    }
}

/// Pattern-based classifier. Patterns are matched case-insensitively as
/// substrings of the response message.
#[derive(Debug, Clone)]
pub struct SessionGuard {
    blocked_patterns: Vec<String>,
    invalid_refresh_patterns: Vec<String>,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new(vec!["blocked".into()], vec!["invalid refresh token".into()])
    }
}

impl SessionGuard {
    pub fn new(blocked_patterns: Vec<String>, invalid_refresh_patterns: Vec<String>) -> Self {
        Self {
            blocked_patterns: lowercase_all(blocked_patterns),
            invalid_refresh_patterns: lowercase_all(invalid_refresh_patterns),
        }
    }

    pub fn from_config(config: &crate::ClientConfig) -> Self {
        Self::new(
            config.blocked_patterns.clone(),
            config.invalid_refresh_patterns.clone(),
        )
    }

    /// Classify a failed response. Pure: no side effects.
    pub fn classify(&self, status: u16, body: &str, attempt: &RequestAttempt) -> Classification {
        match status {
            403 => {
                if matches_any(&response_message(body), &self.blocked_patterns) {
                    Classification::BlockedAccount
                } else {
                    Classification::PassThrough
                }
            }
            401 => {
                if matches_any(&response_message(body), &self.invalid_refresh_patterns) {
                    Classification::UnrecoverableAuth
                } else if attempt.refresh_exempt {
                    Classification::PassThrough
                } else if attempt.already_retried {
                    Classification::ExhaustedRetry
                } else {
                    Classification::ExpiredToken
                }
            }
            _ => Classification::PassThrough,
        }
    }
}

/// The human-readable message of an error body: the envelope's `message`
/// when the body is a JSON envelope, otherwise the raw body.
pub fn response_message(body: &str) -> String {
    serde_json::from_str::<ApiEnvelope>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string())
}

fn matches_any(message: &str, patterns: &[String]) -> bool {
    let lower = message.to_lowercase();
    patterns
        .iter()
        .any(|p| !p.is_empty() && lower.contains(p.as_str()))
}

fn lowercase_all(patterns: Vec<String>) -> Vec<String> {
    patterns.into_iter().map(|p| p.to_lowercase()).collect()
}
