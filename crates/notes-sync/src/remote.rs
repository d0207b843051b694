//! RemoteClient trait for the authoritative note service.
//!
//! Implementations:
//! - `SimulatedRemote` - In-memory server with failure injection, for testing
//! - `HttpRemote` (in notes-client) - REST over HTTP with a bearer token

use async_trait::async_trait;
use thiserror::Error;

use crate::identifier::ServerId;
use crate::note::{Note, NotePayload};

/// How a remote call failed. The engine decides retry, discard or logout
/// purely from this classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// 401: the credential is missing or no longer accepted.
    #[error("Not authenticated")]
    Unauthorized,

    /// Other 4xx: the server refused the request. Retrying will not help.
    #[error("Rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    /// Network failure or 5xx. Worth retrying later.
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl RemoteError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => RemoteError::Unauthorized,
            400..=499 => RemoteError::Rejected { status, message },
            _ => RemoteError::Transient(format!("HTTP {status}: {message}")),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Timeout | RemoteError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// The four note operations against the authoritative service.
///
/// Notes returned by a remote always carry a permanent identifier.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn create(&self, payload: &NotePayload) -> Result<Note>;

    async fn update(&self, id: &ServerId, payload: &NotePayload) -> Result<Note>;

    async fn delete(&self, id: &ServerId) -> Result<()>;

    async fn list(&self) -> Result<Vec<Note>>;
}

/// Source of the bearer credential used by remote clients.
pub trait AuthProvider: Send + Sync {
    fn get_token(&self) -> Option<String>;

    fn is_authenticated(&self) -> bool {
        self.get_token().is_some()
    }
}
