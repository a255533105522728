//! Error types for store operations.

use thiserror::Error;

/// Connection-level failure reported by the transport.
///
/// Transport errors are the retryable class: the request may never have
/// reached the service, so re-issuing it is safe and the client does so with
/// backoff. Everything else propagates immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport failure: {reason}")]
pub struct TransportError {
    pub reason: String,
}

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Master error type for all store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Connection-level failure; retryable.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The service rejected a well-formed request; not retryable.
    #[error("service rejected request: {reason}")]
    Service { reason: String },

    /// A shared in-process table lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn service(reason: impl Into<String>) -> Self {
        Self::Service {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(TransportError::new(reason))
    }

    /// Whether the failure class is worth re-issuing the request for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
