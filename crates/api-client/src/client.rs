//! Authenticated request pipeline
//!
//! `ApiClient::request` is the single entry point for every API call:
//!
//! 1. Read the current access token (fresh on every attempt) and attach it as
//!    a bearer credential, unless the target is the refresh endpoint.
//! 2. Dispatch through the transport.
//! 3. Return 2xx responses unchanged.
//! 4. Hand anything else to the session guard, then pass it through,
//!    terminate the session, or refresh once and replay.
//!
//! A logical request is replayed at most once after an auth failure. When the
//! 401 arrives after another caller already rotated the token, the replay uses
//! the rotated token directly instead of starting a second refresh.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use session_auth::{BEARER_PREFIX, CredentialSource, MemoryCredentialSource};
use tracing::{debug, instrument, warn};
use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

use crate::config::ClientConfig;
use crate::error::{Error, HttpError, Result};
use crate::guard::{Classification, RequestAttempt, SessionGuard};
use crate::metrics::{self, RequestOutcome};
use crate::refresh::RefreshCoordinator;
use crate::termination::{SessionTermination, SessionTerminationHandler, TerminationReason};

/// Correlation header carried on every attempt of a logical request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers; an Authorization header here is replaced by the pipeline's own
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

/// Builder wiring the shell's capabilities into a client.
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<Arc<dyn CredentialSource>>,
    on_terminated: Option<Arc<dyn SessionTerminationHandler>>,
}

impl ApiClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn credential_source(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn on_session_terminated<H>(mut self, handler: H) -> Self
    where
        H: SessionTerminationHandler + 'static,
    {
        self.on_terminated = Some(Arc::new(handler));
        self
    }

    /// Validate the config and assemble the client. Defaults: reqwest
    /// transport with a cookie store and the configured timeout, in-memory
    /// credential source, no termination handler.
    pub fn build(self) -> Result<ApiClient> {
        self.config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_timeout(self.config.timeout())?),
        };
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(MemoryCredentialSource::new()));

        let refresher = RefreshCoordinator::new(
            transport.clone(),
            credentials.clone(),
            self.config.refresh_url(),
            Some(self.config.timeout()),
        );
        let termination = SessionTermination::new(credentials.clone(), self.on_terminated);

        Ok(ApiClient {
            guard: SessionGuard::from_config(&self.config),
            config: self.config,
            transport,
            credentials,
            refresher,
            termination,
        })
    }
}

/// The request pipeline. One instance per API session context; instances
/// share nothing unless given the same credential source.
pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    guard: SessionGuard,
    refresher: RefreshCoordinator,
    termination: SessionTermination,
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            transport: None,
            credentials: None,
            on_terminated: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Install the token obtained at login. A present token starts a new
    /// session; any token appearing in the credential source re-arms the
    /// termination signal, this just makes it explicit.
    pub fn set_access_token(&self, token: Option<String>) {
        let present = token.is_some();
        self.credentials.set_token(token.map(Secret::new));
        if present {
            self.termination.rearm();
        }
    }

    /// Drop the access token (logout). Does not notify the termination handler.
    pub fn clear_credential(&self) {
        self.credentials.clear();
    }

    pub fn is_session_terminated(&self) -> bool {
        self.termination.is_terminated()
    }

    /// Issue one logical request. See the module docs for the retry rules.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let url = self.config.resolve_url(path);
        let result = if self.config.is_api_url(&url) {
            self.dispatch(method, url, body, options, &request_id)
                .await
        } else {
            warn!(%url, "refusing request outside the configured base URL");
            Err(Error::InvalidRequest(format!(
                "{url} is outside the configured base URL"
            )))
        };

        metrics::record_request(match &result {
            Ok(_) => RequestOutcome::Success,
            Err(Error::RefreshFailed { .. }) => RequestOutcome::RefreshFailed,
            Err(Error::Transport(_)) => RequestOutcome::TransportError,
            Err(_) => RequestOutcome::HttpError,
        });
        result
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.request(Method::GET, path, None, RequestOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.request(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.request(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<HttpResponse> {
        self.request(Method::PATCH, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse> {
        self.request(Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %method, url = %url))]
    async fn dispatch(
        &self,
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
        options: RequestOptions,
        request_id: &str,
    ) -> Result<HttpResponse> {
        let exempt = self.config.is_refresh_endpoint(&url);
        let mut attempt = RequestAttempt::new(exempt);
        let mut replay_token: Option<Secret<String>> = None;

        loop {
            let sent_token = if exempt {
                None
            } else {
                replay_token.take().or_else(|| self.credentials.get_token())
            };
            let request = build_request(
                &method,
                &url,
                &body,
                &options,
                sent_token.as_ref(),
                request_id,
            )?;

            let response = self.transport.send(request).await.map_err(|e| {
                warn!(error = %e, "transport failure");
                Error::Transport(e)
            })?;

            if response.is_success() {
                debug!(status = response.status, retried = attempt.already_retried, "request succeeded");
                return Ok(response);
            }

            let status = response.status;
            let body_text = response.text();
            let classification = self.guard.classify(status, &body_text, &attempt);
            let error = HttpError::new(status, body_text, classification);
            debug!(status, classification = classification.label(), "request failed");

            match classification {
                Classification::PassThrough => return Err(Error::Http(error)),
                Classification::ExhaustedRetry => {
                    warn!(status, "authentication failed again after refresh, giving up");
                    return Err(Error::Http(error));
                }
                Classification::BlockedAccount => {
                    self.termination.fire(TerminationReason::BlockedAccount);
                    return Err(Error::Http(error));
                }
                Classification::UnrecoverableAuth => {
                    self.termination.fire(TerminationReason::InvalidRefreshToken);
                    return Err(Error::Http(error));
                }
                Classification::ExpiredToken => {
                    attempt.already_retried = true;

                    if let Some(current) = self.credentials.get_token()
                        && sent_token.as_ref() != Some(&current)
                    {
                        debug!("token rotated while request was in flight, replaying");
                        replay_token = Some(current);
                        continue;
                    }

                    match self.refresher.refresh().await {
                        Ok(token) => {
                            debug!("replaying request with refreshed token");
                            replay_token = Some(token);
                        }
                        Err(source) => {
                            self.termination.fire(TerminationReason::RefreshFailed);
                            return Err(Error::RefreshFailed {
                                original: error,
                                source,
                            });
                        }
                    }
                }
            }
        }
    }
}

fn build_request(
    method: &Method,
    url: &str,
    body: &Option<serde_json::Value>,
    options: &RequestOptions,
    token: Option<&Secret<String>>,
    request_id: &str,
) -> Result<HttpRequest> {
    let mut request = HttpRequest::new(method.clone(), url);
    request.headers = options.headers.clone();
    request.headers.remove(AUTHORIZATION);
    request.body = body.clone();
    request.timeout = options.timeout;

    request.headers.insert(
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderValue::from_str(request_id)
            .map_err(|e| Error::InvalidRequest(format!("invalid request id: {e}")))?,
    );

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("{BEARER_PREFIX}{}", token.expose()))
            .map_err(|e| Error::InvalidRequest(format!("invalid access token value: {e}")))?;
        value.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, value);
    }

    Ok(request)
}
