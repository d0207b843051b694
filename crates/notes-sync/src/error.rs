//! Error types for the reconciliation engine.
//!
//! Remote failures (`RemoteError`) are mostly absorbed by the engine: transient
//! and rejected calls fall back to the local queue or show up in a
//! `FlushReport`. What reaches the consumer is defined here.

use thiserror::Error;

use crate::identifier::Identifier;
use crate::kv::StoreError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced to the consumer of the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The server answered 401. Local state has been cleared; the user must log in again.
    #[error("Authentication required")]
    AuthRequired,

    /// The note (or the queue entry it needs) does not exist locally.
    #[error("Note not found: {0}")]
    NotFound(Identifier),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether the user has to re-authenticate before anything else can succeed.
    pub fn is_auth_required(&self) -> bool {
        matches!(self, SyncError::AuthRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ServerId;

    #[test]
    fn test_not_found_display() {
        let err = SyncError::NotFound(ServerId::from(42).into());
        assert_eq!(err.to_string(), "Note not found: 42");
    }

    #[test]
    fn test_store_error_conversion() {
        let err: SyncError = StoreError::Io("disk full".into()).into();
        assert!(matches!(err, SyncError::Store(_)));
        assert!(!err.is_auth_required());
        assert!(SyncError::AuthRequired.is_auth_required());
    }
}
