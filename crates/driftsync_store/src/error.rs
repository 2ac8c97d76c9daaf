//! Error types for local store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by a repository session.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The caller passed an unusable request (e.g. an empty id set).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backing store returned no data where some was required.
    ///
    /// Distinct from an empty result set: this is the "null cursor" case
    /// and is propagated to the caller rather than treated as success.
    #[error("no data: {0}")]
    NoData(String),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a no-data error.
    pub fn no_data(message: impl Into<String>) -> Self {
        Self::NoData(message.into())
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
