//! Seam to the external identity provider.
//!
//! Sign-in can wait on the user for an arbitrarily long time, so a provider
//! never answers inline. It is handed an [`AuthCompletion`] and resolves it
//! whenever the exchange finishes, from any thread. The outcome travels back
//! to the event loop as an [`AuthOutcome`] message.

use crate::error::SyncError;
use crate::types::Identity;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("sign-in cancelled")]
    Cancelled,

    #[error("identity provider error: {0}")]
    Provider(String),
}

impl From<AuthFailure> for SyncError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::Cancelled => SyncError::AuthCancelled,
            AuthFailure::Provider(msg) => SyncError::Transport(msg),
        }
    }
}

/// Result of one sign-in attempt, as delivered to the event loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthOutcome {
    pub attempt: u64,
    pub result: Result<Identity, AuthFailure>,
}

/// One-shot reply slot for a sign-in attempt.
///
/// Dropping it unresolved counts as the user cancelling.
pub struct AuthCompletion {
    attempt: u64,
    sender: Option<Sender<AuthOutcome>>,
}

impl AuthCompletion {
    pub(crate) fn new(attempt: u64, sender: Sender<AuthOutcome>) -> Self {
        Self {
            attempt,
            sender: Some(sender),
        }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn succeed(self, identity: Identity) -> bool {
        self.complete(Ok(identity))
    }

    pub fn fail(self, failure: AuthFailure) -> bool {
        self.complete(Err(failure))
    }

    /// Deliver the outcome. Returns false if the event loop is gone.
    pub fn complete(mut self, result: Result<Identity, AuthFailure>) -> bool {
        self.deliver(result)
    }

    fn deliver(&mut self, result: Result<Identity, AuthFailure>) -> bool {
        match self.sender.take() {
            Some(sender) => sender
                .send(AuthOutcome {
                    attempt: self.attempt,
                    result,
                })
                .is_ok(),
            None => false,
        }
    }
}

impl Drop for AuthCompletion {
    fn drop(&mut self) {
        if self.sender.is_some() {
            tracing::debug!(attempt = self.attempt, "sign-in completion dropped unresolved");
            self.deliver(Err(AuthFailure::Cancelled));
        }
    }
}

/// External identity provider.
pub trait AuthProvider: Send + Sync {
    /// Start an exchange. Must not block; resolve `completion` later.
    fn begin(&self, completion: AuthCompletion);
}

/// Provider that answers every attempt immediately with a fixed result.
#[derive(Clone, Debug)]
pub struct StaticAuthProvider {
    result: Result<Identity, AuthFailure>,
}

impl StaticAuthProvider {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            result: Ok(Identity::new(user_id)),
        }
    }

    pub fn failing(failure: AuthFailure) -> Self {
        Self {
            result: Err(failure),
        }
    }
}

impl AuthProvider for StaticAuthProvider {
    fn begin(&self, completion: AuthCompletion) {
        completion.complete(self.result.clone());
    }
}

/// Provider that parks attempts until resolved by hand.
///
/// Models a user who has not finished the sign-in popup yet. Clones share
/// the same queue.
#[derive(Clone, Default)]
pub struct DeferredAuthProvider {
    pending: Arc<Mutex<VecDeque<AuthCompletion>>>,
}

impl DeferredAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Resolve the oldest pending attempt. Returns false if none was pending.
    pub fn resolve_next(&self, result: Result<Identity, AuthFailure>) -> bool {
        let next = self.pending.lock().pop_front();
        match next {
            Some(completion) => completion.complete(result),
            None => false,
        }
    }

    /// Resolve the newest pending attempt.
    pub fn resolve_latest(&self, result: Result<Identity, AuthFailure>) -> bool {
        let latest = self.pending.lock().pop_back();
        match latest {
            Some(completion) => completion.complete(result),
            None => false,
        }
    }
}

impl AuthProvider for DeferredAuthProvider {
    fn begin(&self, completion: AuthCompletion) {
        self.pending.lock().push_back(completion);
    }
}
