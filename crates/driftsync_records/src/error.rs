//! Error types for the record model.

use thiserror::Error;

/// Result type for record operations.
pub type RecordsResult<T> = Result<T, RecordsError>;

/// Errors produced when converting between records and typed payloads.
#[derive(Error, Debug)]
pub enum RecordsError {
    /// The payload did not match the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A typed payload was read from a record of another collection.
    #[error("record belongs to collection {got:?}, expected {expected:?}")]
    WrongCollection {
        /// The record's collection.
        got: String,
        /// The collection the payload type belongs to.
        expected: String,
    },
}

impl RecordsError {
    /// Creates a malformed-payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }
}
