//! Error types for crypto operations.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during key handling and envelope crypto.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// A key had the wrong length.
    #[error("invalid key length: got {got}, expected {expected}")]
    InvalidKeyLength {
        /// Actual length in bytes.
        got: usize,
        /// Required length in bytes.
        expected: usize,
    },

    /// HMAC verification failed; the payload was tampered with or the
    /// wrong bundle was used.
    #[error("payload HMAC verification failed")]
    HmacMismatch,

    /// Decryption failed after a valid HMAC (corrupted nonce/ciphertext).
    #[error("payload decryption failed")]
    DecryptionFailed,

    /// Encryption failed.
    #[error("payload encryption failed")]
    EncryptionFailed,

    /// A base64/hex field could not be decoded.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

impl CryptoError {
    /// Creates an invalid-encoding error.
    pub fn invalid_encoding(message: impl Into<String>) -> Self {
        Self::InvalidEncoding(message.into())
    }
}
