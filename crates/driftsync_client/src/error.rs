//! Error types for storage client operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to the storage service.
///
/// Failures are explicit values consumed by pattern matching; there is no
/// delegate hierarchy. HTTP 412 gets its own variant because callers must
/// treat it as a non-fatal collision.
#[derive(Error, Debug)]
pub enum StorageError {
    /// HTTP 412: the precondition failed because another writer got there
    /// first.
    #[error("precondition failed: concurrent write detected")]
    Collision,

    /// HTTP 404 where the resource was required.
    #[error("resource not found")]
    NotFound,

    /// Any other non-2xx HTTP status.
    #[error("HTTP failure: {0}")]
    HttpStatus(u16),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A response body failed to parse.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Wire protocol encode/decode error.
    #[error(transparent)]
    Protocol(#[from] driftsync_protocol::ProtocolError),

    /// A response that should carry a server timestamp did not.
    #[error("response is missing its server timestamp")]
    MissingTimestamp,
}

impl StorageError {
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

    /// Creates a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Transport { retryable, .. } => *retryable,
            StorageError::HttpStatus(status) => matches!(*status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}
