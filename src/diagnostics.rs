//! Diagnostic sink for contained, non-fatal failures.
//!
//! The router never surfaces store or command errors to the UI unless a
//! command explicitly lists an event. Everything else lands here, so tests
//! can assert on what was reported instead of scraping log output.

use crate::error::{ErrorKind, SyncError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// What a diagnostic is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Error text forwarded from the UI via `LogError`.
    UiReported,
    /// Unknown tag or missing/invalid field.
    MalformedCommand,
    Transport,
    Permission,
    AuthCancelled,
    AuthFailed,
    NotSignedIn,
    /// UI-supplied owner id did not match the caller.
    OwnerMismatch,
    /// A watched document does not exist.
    MissingDocument,
    /// The store stopped serving a watch and it was re-established.
    SubscriptionLost,
    Internal,
}

impl From<ErrorKind> for DiagnosticKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Transport => DiagnosticKind::Transport,
            ErrorKind::Permission => DiagnosticKind::Permission,
            ErrorKind::AuthCancelled => DiagnosticKind::AuthCancelled,
            ErrorKind::MalformedCommand => DiagnosticKind::MalformedCommand,
            ErrorKind::NotFound => DiagnosticKind::MissingDocument,
            ErrorKind::NotSignedIn => DiagnosticKind::NotSignedIn,
            ErrorKind::Serialization | ErrorKind::Io => DiagnosticKind::Internal,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
        }
    }

    /// Report `err` raised while doing `context`.
    pub fn from_error(context: &str, err: &SyncError) -> Self {
        let severity = match err.kind() {
            ErrorKind::AuthCancelled => Severity::Info,
            ErrorKind::NotFound | ErrorKind::NotSignedIn | ErrorKind::MalformedCommand => {
                Severity::Warn
            }
            _ => Severity::Error,
        };
        Self::new(severity, err.kind().into(), format!("{context}: {err}"))
    }
}

/// Receiver of diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, d: Diagnostic) {
        match d.severity {
            Severity::Info => tracing::info!(kind = ?d.kind, "{}", d.message),
            Severity::Warn => tracing::warn!(kind = ?d.kind, "{}", d.message),
            Severity::Error => tracing::error!(kind = ?d.kind, "{}", d.message),
        }
    }
}

/// Collects diagnostics in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.lock().iter().filter(|d| d.kind == kind).count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, diagnostic: Diagnostic) {
        tracing::debug!(kind = ?diagnostic.kind, "{}", diagnostic.message);
        self.entries.lock().push(diagnostic);
    }
}
