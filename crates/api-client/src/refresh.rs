//! Single-flight access token refresh
//!
//! State machine: Idle → Refreshing → Idle. The first caller to find the
//! coordinator Idle spawns the one refresh task and stores a shared handle to
//! its result; every caller arriving while it is outstanding clones that
//! handle instead of issuing another network call.
//!
//! The task runs on the runtime independently of its waiters, so a cancelled
//! caller cannot strand the cycle. It writes the new token and puts the state
//! back to Idle itself when it settles. The single-flight check and the store
//! of the pending handle happen under one lock acquisition; the lock is never
//! held across an await.
//!
//! Must be called from within a tokio runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use common::Secret;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use session_auth::{CredentialSource, RefreshError, refresh_access_token};
use tracing::{debug, info, warn};
use transport::Transport;

use crate::metrics;

type RefreshResult = std::result::Result<Secret<String>, RefreshError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

enum RefreshState {
    Idle,
    /// Holds only the task's join handle, never `Inner` itself
    Refreshing { cycle: u64, pending: PendingRefresh },
}

struct Inner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    refresh_url: String,
    timeout: Option<Duration>,
    state: Mutex<RefreshState>,
    network_calls: AtomicU64,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Executes the refresh call at most once per refresh cycle.
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
        refresh_url: String,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                credentials,
                refresh_url,
                timeout,
                state: Mutex::new(RefreshState::Idle),
                network_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain a fresh access token, joining any refresh already in flight.
    ///
    /// On success the credential source already holds the new token when this
    /// returns. On failure the credential source is left untouched and every
    /// waiter of the same cycle receives the same error. Dropping the returned
    /// future does not cancel the refresh.
    pub async fn refresh(&self) -> RefreshResult {
        let pending = {
            let mut state = self.inner.lock_state();
            match &*state {
                RefreshState::Refreshing { pending, .. } => {
                    debug!("joining in-flight token refresh");
                    metrics::record_refresh_joined();
                    pending.clone()
                }
                RefreshState::Idle => {
                    let cycle = self.inner.network_calls.fetch_add(1, Ordering::Relaxed) + 1;
                    let task = tokio::spawn(run_refresh(self.inner.clone(), cycle));
                    let pending = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(RefreshError::Interrupted(e.to_string()))
                        })
                    }
                    .boxed()
                    .shared();
                    *state = RefreshState::Refreshing {
                        cycle,
                        pending: pending.clone(),
                    };
                    pending
                }
            }
        };
        pending.await
    }

    pub fn state(&self) -> RefreshPhase {
        match &*self.inner.lock_state() {
            RefreshState::Idle => RefreshPhase::Idle,
            RefreshState::Refreshing { .. } => RefreshPhase::Refreshing,
        }
    }

    /// Number of refresh network calls issued so far.
    pub fn network_calls(&self) -> u64 {
        self.inner.network_calls.load(Ordering::Relaxed)
    }
}

/// The one network call of refresh cycle `cycle`. Settling resets the state
/// to Idle, provided no later cycle has replaced it.
async fn run_refresh(inner: Arc<Inner>, cycle: u64) -> RefreshResult {
    let started = Instant::now();
    info!(url = %inner.refresh_url, cycle, "refreshing access token");

    let result =
        refresh_access_token(inner.transport.as_ref(), &inner.refresh_url, inner.timeout).await;
    let elapsed = started.elapsed().as_secs_f64();

    match &result {
        Ok(token) => {
            inner.credentials.set_token(Some(token.clone()));
            metrics::record_refresh_call(true, elapsed);
            info!(elapsed_ms = (elapsed * 1000.0) as u64, "token refresh succeeded");
        }
        Err(e) => {
            metrics::record_refresh_call(false, elapsed);
            warn!(error = %e, "token refresh failed");
        }
    }

    let mut state = inner.lock_state();
    if matches!(&*state, RefreshState::Refreshing { cycle: current, .. } if *current == cycle) {
        *state = RefreshState::Idle;
    }
    drop(state);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use session_auth::MemoryCredentialSource;
    use transport::{HttpResponse, TransportError};

    const REFRESH_URL: &str = "http://api.test/auth/refresh";

    fn coordinator(
        transport: Arc<ScriptedTransport>,
        credentials: Arc<MemoryCredentialSource>,
    ) -> RefreshCoordinator {
        RefreshCoordinator::new(transport, credentials, REFRESH_URL.to_string(), None)
    }

    fn token_response(token: &str) -> HttpResponse {
        HttpResponse::json_body(200, &serde_json::json!({"success": true, "token": token}))
    }

    #[tokio::test]
    async fn refresh_updates_credentials_and_returns_to_idle() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/auth/refresh", Ok(token_response("T2")));
        let credentials = Arc::new(MemoryCredentialSource::with_token("T1"));
        let coordinator = coordinator(transport.clone(), credentials.clone());

        let token = coordinator.refresh().await.unwrap();
        assert_eq!(token.expose(), "T2");
        assert_eq!(credentials.get_token().unwrap().expose(), "T2");
        assert_eq!(coordinator.state(), RefreshPhase::Idle);
        assert_eq!(coordinator.network_calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_network_call() {
        let transport = Arc::new(ScriptedTransport::new());
        let gate = transport.gate("/auth/refresh");
        transport.respond("/auth/refresh", Ok(token_response("T2")));
        let credentials = Arc::new(MemoryCredentialSource::with_token("T1"));
        let coordinator = Arc::new(coordinator(transport.clone(), credentials));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh().await })
            })
            .collect();

        // Let every task reach the pending refresh before releasing it
        transport.wait_for_calls("/auth/refresh", 1).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.state(), RefreshPhase::Refreshing);
        gate.notify_one();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose(), "T2");
        }
        assert_eq!(transport.calls_to("/auth/refresh"), 1);
        assert_eq!(coordinator.network_calls(), 1);
        assert_eq!(coordinator.state(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter_and_leaves_credentials() {
        let transport = Arc::new(ScriptedTransport::new());
        let gate = transport.gate("/auth/refresh");
        transport.respond(
            "/auth/refresh",
            Err(TransportError::Connect("connection refused".into())),
        );
        let credentials = Arc::new(MemoryCredentialSource::with_token("T1"));
        let coordinator = Arc::new(coordinator(transport.clone(), credentials.clone()));

        let a = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });
        let b = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });

        transport.wait_for_calls("/auth/refresh", 1).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        let err_a = a.await.unwrap().unwrap_err();
        let err_b = b.await.unwrap().unwrap_err();
        assert!(matches!(err_a, RefreshError::Transport(_)));
        assert_eq!(err_a, err_b);
        assert_eq!(transport.calls_to("/auth/refresh"), 1);
        assert_eq!(credentials.get_token().unwrap().expose(), "T1");
        assert_eq!(coordinator.state(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn aborted_initiator_does_not_strand_the_cycle() {
        let transport = Arc::new(ScriptedTransport::new());
        let gate = transport.gate("/auth/refresh");
        transport.respond("/auth/refresh", Ok(token_response("T2")));
        let credentials = Arc::new(MemoryCredentialSource::with_token("T1"));
        let coordinator = Arc::new(coordinator(transport.clone(), credentials.clone()));

        let initiator = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });
        transport.wait_for_calls("/auth/refresh", 1).await;
        initiator.abort();
        assert!(initiator.await.unwrap_err().is_cancelled());

        gate.notify_one();
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.state() != RefreshPhase::Idle {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("refresh cycle never settled");

        assert_eq!(credentials.get_token().unwrap().expose(), "T2");
        assert_eq!(transport.calls_to("/auth/refresh"), 1);
    }

    #[tokio::test]
    async fn late_joiner_after_aborted_initiator_gets_the_token() {
        let transport = Arc::new(ScriptedTransport::new());
        let gate = transport.gate("/auth/refresh");
        transport.respond("/auth/refresh", Ok(token_response("T2")));
        let credentials = Arc::new(MemoryCredentialSource::with_token("T1"));
        let coordinator = Arc::new(coordinator(transport.clone(), credentials));

        let initiator = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });
        transport.wait_for_calls("/auth/refresh", 1).await;
        initiator.abort();

        let joiner = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        assert_eq!(joiner.await.unwrap().unwrap().expose(), "T2");
        assert_eq!(transport.calls_to("/auth/refresh"), 1);
    }

    #[tokio::test]
    async fn sequential_cycles_each_issue_a_call() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/auth/refresh", Ok(token_response("T2")));
        transport.respond("/auth/refresh", Ok(token_response("T3")));
        let credentials = Arc::new(MemoryCredentialSource::with_token("T1"));
        let coordinator = coordinator(transport.clone(), credentials.clone());

        assert_eq!(coordinator.refresh().await.unwrap().expose(), "T2");
        assert_eq!(coordinator.refresh().await.unwrap().expose(), "T3");
        assert_eq!(transport.calls_to("/auth/refresh"), 2);
        assert_eq!(credentials.get_token().unwrap().expose(), "T3");
    }

    #[tokio::test]
    async fn refresh_call_carries_no_bearer_token() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/auth/refresh", Ok(token_response("T2")));
        let credentials = Arc::new(MemoryCredentialSource::with_token("T1"));
        let coordinator = coordinator(transport.clone(), credentials);

        coordinator.refresh().await.unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].bearer_token().is_none());
        assert_eq!(requests[0].headers.get("cache-control").unwrap(), "no-cache");
    }
}
