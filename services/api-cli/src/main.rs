//! Job portal API command-line shell
//!
//! Single-binary front end for the authenticated client:
//! 1. Loads the `[client]` config and the access token from the environment
//! 2. Wires the request pipeline with a session-termination handler
//! 3. Issues one request and prints the response body to stdout
//! 4. Optionally dumps client metrics (`--metrics`) to stderr

mod config;
mod metrics;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use api_client::{ApiClient, RequestOptions};
use reqwest::Method;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::HttpResponse;

use crate::config::Config;

const USAGE: &str = "usage: jobportal-api --path <path> [--method <verb>] [--body <json>] [--config <file>] [--metrics]";

/// Parsed command-line arguments
#[derive(Debug)]
struct CliArgs {
    config: Option<String>,
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    metrics: bool,
}

impl CliArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let flag = |name: &str| {
            args.iter()
                .position(|a| a == name)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        let path = flag("--path").context(USAGE)?;
        let method = match flag("--method") {
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid HTTP method: {m}"))?,
            None => Method::GET,
        };
        let body = flag("--body")
            .map(|b| serde_json::from_str::<serde_json::Value>(&b).context("--body must be valid JSON"))
            .transpose()?;

        Ok(Self {
            config: flag("--config"),
            method,
            path,
            body,
            metrics: args.iter().any(|a| a == "--metrics"),
        })
    }
}

/// Pretty-print JSON bodies, pass anything else through as text.
fn render_body(response: &HttpResponse) -> String {
    match response.json::<serde_json::Value>() {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| response.text()),
        Err(_) => response.text(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli = CliArgs::parse(&args)?;

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.client.base_url,
        refresh_path = %config.client.refresh_path,
        timeout_secs = config.client.timeout_secs,
        "configuration loaded"
    );

    let session_ended = Arc::new(AtomicBool::new(false));
    let client = ApiClient::builder(config.client)
        .on_session_terminated({
            let session_ended = session_ended.clone();
            move || {
                session_ended.store(true, Ordering::SeqCst);
                warn!("session terminated, log in again to obtain a new access token");
            }
        })
        .build()
        .context("failed to build API client")?;

    match config::access_token_from_env() {
        Some(token) => client.set_access_token(Some(token)),
        None => info!("API_ACCESS_TOKEN not set, sending unauthenticated requests"),
    }

    let result = client
        .request(
            cli.method.clone(),
            &cli.path,
            cli.body,
            RequestOptions::default(),
        )
        .await;

    if cli.metrics {
        eprintln!("{}", prometheus_handle.render());
    }
    if session_ended.load(Ordering::SeqCst) {
        eprintln!("session ended: credentials were cleared");
    }

    let response = result.with_context(|| format!("{} {} failed", cli.method, cli.path))?;
    println!("{}", render_body(&response));
    Ok(())
}
