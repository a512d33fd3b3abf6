//! Transport abstraction for outbound API calls
//!
//! Defines the `Transport` trait that decouples the authenticated request
//! pipeline from the HTTP stack. A transport performs exactly one network call
//! per `send` and reports either a structured response (any status code, 2xx or
//! not) or a structured `TransportError`. Retry, refresh and session handling
//! live above this layer.
//!
//! `ReqwestTransport` is the production implementation. Tests in the client
//! crate substitute a scripted transport through the same trait.

pub mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors raised when a request never produced an HTTP response.
///
/// `Clone` so a single failure can be handed to several waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// A fully resolved outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL (base URL already applied)
    pub url: String,
    pub headers: HeaderMap,
    /// JSON body, serialized by the transport
    pub body: Option<serde_json::Value>,
    /// Per-request timeout override; transports fall back to their default
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// The bearer token carried in the Authorization header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A response as received from the network, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Build a response with a JSON body (used by tests and mock transports).
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Decode the standard API envelope. Returns `None` for non-JSON bodies.
    pub fn envelope(&self) -> Option<ApiEnvelope> {
        self.json::<ApiEnvelope>().ok()
    }
}

/// Response envelope used by every endpoint of the API:
/// `{ "success": bool, "message"?: string, "data"?: T, "token"?: string }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ApiEnvelope<T = serde_json::Value> {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Performs the underlying network call. No retry logic of its own.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "reqwest", "scripted")
    fn id(&self) -> &str;

    /// Dispatch one request. Non-2xx statuses are returned as `Ok`; only
    /// failures that produced no response at all are `Err`.
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>>;
}
