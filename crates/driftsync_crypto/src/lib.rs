//! # driftsync crypto
//!
//! Key material and authenticated record encryption for driftsync.
//!
//! This crate provides:
//! - [`KeyBundle`]: an encryption key + HMAC key pair, zeroized on drop
//! - [`CollectionKeys`]: per-collection key bundles with a default
//! - [`EncryptedPayload`]: the authenticated-encrypted wire body of a record
//! - HKDF-SHA256 derivation of bundles from an account master key
//! - Sync GUID generation
//!
//! ## Security Model
//!
//! - AES-256-GCM for encryption, with a unique nonce per operation
//! - Encrypt-then-MAC: HMAC-SHA256 over the encoded ciphertext, verified
//!   before any decryption is attempted
//! - Keys are zeroized on drop
//! - Verification failure is a hard error, never silently ignored

mod bundle;
mod envelope;
mod error;
mod guid;

pub use bundle::{CollectionKeys, KeyBundle, KEY_SIZE};
pub use envelope::{EncryptedPayload, NONCE_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use guid::generate_guid;
