//! Error types for the sync engine.

use driftsync_core::RecordId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or remote failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A network operation exceeded its timeout. Treated like a
    /// retryable transport failure.
    #[error("operation timed out")]
    Timeout,

    /// The security layer rejected a write. Never retried: repeating
    /// the write would repeat the denial.
    #[error("write denied by policy for entity {entity_id}: {message}")]
    PolicyDenied {
        /// Identity of the rejected record.
        entity_id: RecordId,
        /// Denial reason reported by the policy layer.
        message: String,
    },

    /// Local storage failure other than a policy denial.
    #[error("storage error: {0}")]
    Storage(String),

    /// The engine was misused: not initialized, invalid options, or a
    /// decision missing its required input. Fatal to the call, never
    /// retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The referenced conflict is not pending.
    #[error("unknown conflict: {0}")]
    UnknownConflict(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }
}
