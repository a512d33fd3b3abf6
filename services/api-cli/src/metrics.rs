//! Prometheus metrics exposition
//!
//! Installs the recorder that the client crate's `metrics` calls report to:
//!
//! - `api_requests_total` (counter): label `outcome`
//! - `api_refresh_calls_total` (counter): label `result`
//! - `api_refresh_duration_seconds` (histogram)
//! - `api_refresh_joined_total` (counter)
//! - `api_session_terminations_total` (counter): label `reason`

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Refresh round-trips range from a few milliseconds to the transport timeout.
const REFRESH_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("api_refresh_duration_seconds".to_string()),
            REFRESH_BUCKETS,
        )
        .context("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}
