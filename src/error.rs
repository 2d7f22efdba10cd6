//! Error types for the channel synchronization core.

use crate::types::DocumentKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for store and routing operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store unreachable: {0}")]
    Transport(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Sign-in cancelled by user")]
    AuthCancelled,

    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Document not found: {0}")]
    NotFound(DocumentKey),

    #[error("No signed-in identity")]
    NotSignedIn,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`SyncError`].
///
/// Store failures always surface with one of these kinds, never as a silent
/// no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Permission,
    AuthCancelled,
    MalformedCommand,
    NotFound,
    NotSignedIn,
    Serialization,
    Io,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport(_) => ErrorKind::Transport,
            SyncError::Permission(_) => ErrorKind::Permission,
            SyncError::AuthCancelled => ErrorKind::AuthCancelled,
            SyncError::MalformedCommand(_) => ErrorKind::MalformedCommand,
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::NotSignedIn => ErrorKind::NotSignedIn,
            SyncError::Serialization(_) => ErrorKind::Serialization,
            SyncError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
