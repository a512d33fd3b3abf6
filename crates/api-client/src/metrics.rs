//! Client metrics
//!
//! Emitted through the `metrics` facade; the shell decides whether a recorder
//! is installed. Without one every call here is a no-op.
//!
//! - `api_requests_total` (counter): label `outcome`
//! - `api_refresh_calls_total` (counter): label `result`
//! - `api_refresh_duration_seconds` (histogram)
//! - `api_refresh_joined_total` (counter)
//! - `api_session_terminations_total` (counter): label `reason`

use crate::termination::TerminationReason;

/// Final outcome of one logical `request` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    HttpError,
    TransportError,
    RefreshFailed,
}

impl RequestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::HttpError => "http_error",
            RequestOutcome::TransportError => "transport_error",
            RequestOutcome::RefreshFailed => "refresh_failed",
        }
    }
}

pub fn record_request(outcome: RequestOutcome) {
    metrics::counter!("api_requests_total", "outcome" => outcome.label()).increment(1);
}

/// One refresh network call completed.
pub fn record_refresh_call(success: bool, duration_secs: f64) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("api_refresh_calls_total", "result" => result).increment(1);
    metrics::histogram!("api_refresh_duration_seconds").record(duration_secs);
}

/// A caller attached to an in-flight refresh instead of starting one.
pub fn record_refresh_joined() {
    metrics::counter!("api_refresh_joined_total").increment(1);
}

pub fn record_session_termination(reason: TerminationReason) {
    metrics::counter!("api_session_terminations_total", "reason" => reason.label()).increment(1);
}
