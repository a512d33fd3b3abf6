//! Session termination signal
//!
//! Fired by the pipeline on every unrecoverable session failure. Firing
//! clears the credential source and notifies the shell. While that teardown
//! is pending (flag set, credential source still empty) further fires are
//! absorbed, so concurrent terminal failures tear the session down once.
//! As soon as a token is present again, whether the shell wrote it through
//! its own hooks or a refresh restored it, the next terminal failure fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use session_auth::CredentialSource;
use tracing::{debug, warn};

use crate::metrics;

/// Shell-side reaction to the session ending (drop local state, route to login).
pub trait SessionTerminationHandler: Send + Sync {
    fn on_session_terminated(&self);
}

impl<F> SessionTerminationHandler for F
where
    F: Fn() + Send + Sync,
{
    fn on_session_terminated(&self) {
        self()
    }
}

/// Why the session was ended. Logged and counted; the handler itself takes no arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    BlockedAccount,
    InvalidRefreshToken,
    RefreshFailed,
}

impl TerminationReason {
    pub fn label(&self) -> &'static str {
        match self {
            TerminationReason::BlockedAccount => "blocked_account",
            TerminationReason::InvalidRefreshToken => "invalid_refresh_token",
            TerminationReason::RefreshFailed => "refresh_failed",
        }
    }
}

/// De-duplicating wrapper around the shell's termination handler.
pub struct SessionTermination {
    credentials: Arc<dyn CredentialSource>,
    handler: Option<Arc<dyn SessionTerminationHandler>>,
    /// Serializes the pending check with the credential clear
    teardown: Mutex<()>,
    terminated: AtomicBool,
}

impl SessionTermination {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        handler: Option<Arc<dyn SessionTerminationHandler>>,
    ) -> Self {
        Self {
            credentials,
            handler,
            teardown: Mutex::new(()),
            terminated: AtomicBool::new(false),
        }
    }

    /// Tear the session down. Returns `true` if this call did the teardown,
    /// `false` if a teardown is already pending.
    pub fn fire(&self, reason: TerminationReason) -> bool {
        {
            let _teardown = self.teardown.lock().unwrap_or_else(|e| e.into_inner());
            if self.is_terminated() {
                debug!(reason = reason.label(), "session already terminated, ignoring");
                return false;
            }
            self.terminated.store(true, Ordering::Release);
            self.credentials.clear();
        }

        warn!(reason = reason.label(), "terminating session");
        metrics::record_session_termination(reason);
        if let Some(handler) = &self.handler {
            handler.on_session_terminated();
        }
        true
    }

    /// Start a new session explicitly (login).
    pub fn rearm(&self) {
        self.terminated.store(false, Ordering::Release);
    }

    /// Whether a teardown is pending: fired, and no token has appeared since.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire) && self.credentials.get_token().is_none()
    }
}
