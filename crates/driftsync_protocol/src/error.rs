//! Error types for wire protocol handling.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire bodies.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A body failed to parse as the expected JSON shape.
    #[error("malformed body: {0}")]
    Malformed(String),

    /// An envelope's inner id disagreed with its outer id.
    #[error("envelope id mismatch: outer {outer:?}, inner {inner:?}")]
    IdMismatch {
        /// Id on the envelope.
        outer: String,
        /// Id inside the decrypted payload.
        inner: String,
    },

    /// Envelope crypto failed (verification or decryption).
    #[error(transparent)]
    Crypto(#[from] driftsync_crypto::CryptoError),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates a malformed-body error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}
