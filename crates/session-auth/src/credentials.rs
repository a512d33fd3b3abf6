//! Access token holders
//!
//! The access token lives only in process memory. The pipeline reads it
//! immediately before every dispatch (never cached across calls), so a token
//! installed by one caller's refresh is visible to the next request.
//!
//! Only the refresh coordinator and the session-termination signal write to a
//! credential source; everything else reads.

use std::sync::RwLock;

use common::Secret;
use tracing::debug;

/// Supplies and replaces the current access token.
///
/// Reads and writes are synchronous and never fail. An absent token means
/// requests go out unauthenticated.
pub trait CredentialSource: Send + Sync {
    fn get_token(&self) -> Option<Secret<String>>;

    fn set_token(&self, token: Option<Secret<String>>);

    fn clear(&self) {
        self.set_token(None);
    }
}

/// In-memory token holder owned by the application shell.
#[derive(Default)]
pub struct MemoryCredentialSource {
    token: RwLock<Option<Secret<String>>>,
}

impl MemoryCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(Secret::new(token.into()))),
        }
    }
}

impl CredentialSource for MemoryCredentialSource {
    fn get_token(&self) -> Option<Secret<String>> {
        // A poisoned lock still holds a coherent Option; recover it
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_token(&self, token: Option<Secret<String>>) {
        debug!(present = token.is_some(), "access token replaced");
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

/// Adapts a shell-provided getter/setter pair into a `CredentialSource`.
///
/// Use when the token already lives in application state (e.g. an auth
/// store) and the client should read it from there.
pub struct FnCredentialSource<G, S> {
    getter: G,
    setter: S,
}

impl<G, S> FnCredentialSource<G, S>
where
    G: Fn() -> Option<String> + Send + Sync,
    S: Fn(Option<String>) + Send + Sync,
{
    pub fn new(getter: G, setter: S) -> Self {
        Self { getter, setter }
    }
}

impl<G, S> CredentialSource for FnCredentialSource<G, S>
where
    G: Fn() -> Option<String> + Send + Sync,
    S: Fn(Option<String>) + Send + Sync,
{
    fn get_token(&self) -> Option<Secret<String>> {
        (self.getter)().filter(|t| !t.is_empty()).map(Secret::new)
    }

    fn set_token(&self, token: Option<Secret<String>>) {
        (self.setter)(token.map(|t| t.expose().clone()));
    }
}
