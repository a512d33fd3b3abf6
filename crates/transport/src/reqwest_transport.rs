//! reqwest-backed transport.
//!
//! One `send` is one network call. Timeouts come from the request override or
//! the transport default and surface as `TransportError::Timeout`. The client
//! keeps a cookie store, which is where the refresh token lives between calls.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::{HttpRequest, HttpResponse, Result, Transport, TransportError};

/// Production transport over a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    /// Transport over a fresh client with its own cookie store.
    pub fn with_timeout(default_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(client, default_timeout))
    }
}

impl Transport for ReqwestTransport {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>> {
        Box::pin(async move {
            let timeout = request.timeout.unwrap_or(self.default_timeout);
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .headers(request.headers)
                .timeout(timeout);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(map_send_error)?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(format!("reading body of {}: {e}", request.url))
                } else {
                    TransportError::Body(e.to_string())
                }
            })?;

            debug!(method = %request.method, url = %request.url, status, bytes = body.len(), "response received");
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
