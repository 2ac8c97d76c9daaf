//! Key bundles and per-collection key management.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use std::collections::HashMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of each key in a bundle, in bytes.
pub const KEY_SIZE: usize = 32;

/// An encryption key + HMAC key pair scoped to a collection.
///
/// Both keys are zeroized when the bundle is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyBundle {
    encryption_key: [u8; KEY_SIZE],
    hmac_key: [u8; KEY_SIZE],
}

impl KeyBundle {
    /// Generates a fresh random bundle.
    #[must_use]
    pub fn generate() -> Self {
        let mut encryption_key = [0u8; KEY_SIZE];
        let mut hmac_key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut encryption_key);
        rand::thread_rng().fill_bytes(&mut hmac_key);
        Self {
            encryption_key,
            hmac_key,
        }
    }

    /// Creates a bundle from raw key material.
    ///
    /// # Errors
    ///
    /// Returns an error if either slice is not exactly 32 bytes.
    pub fn from_bytes(encryption_key: &[u8], hmac_key: &[u8]) -> CryptoResult<Self> {
        if encryption_key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                got: encryption_key.len(),
                expected: KEY_SIZE,
            });
        }
        if hmac_key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                got: hmac_key.len(),
                expected: KEY_SIZE,
            });
        }

        let mut enc = [0u8; KEY_SIZE];
        let mut mac = [0u8; KEY_SIZE];
        enc.copy_from_slice(encryption_key);
        mac.copy_from_slice(hmac_key);
        Ok(Self {
            encryption_key: enc,
            hmac_key: mac,
        })
    }

    /// Derives a bundle from an account master key using HKDF-SHA256.
    ///
    /// The encryption and HMAC keys are expanded with distinct info
    /// strings so compromising one never reveals the other. The account
    /// name acts as the HKDF salt, binding derived keys to the account.
    pub fn derive_from_master(master: &[u8], account: &str) -> CryptoResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        if master.is_empty() {
            return Err(CryptoError::KeyDerivation("empty master key".into()));
        }

        let hk = Hkdf::<Sha256>::new(Some(account.as_bytes()), master);

        let mut encryption_key = [0u8; KEY_SIZE];
        let mut hmac_key = [0u8; KEY_SIZE];
        hk.expand(b"driftsync-encryption-key-v1", &mut encryption_key)
            .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".into()))?;
        hk.expand(b"driftsync-hmac-key-v1", &mut hmac_key)
            .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".into()))?;

        Ok(Self {
            encryption_key,
            hmac_key,
        })
    }

    /// Returns the encryption key.
    ///
    /// # Security
    ///
    /// Be careful with this method - don't log or serialize the result.
    #[must_use]
    pub fn encryption_key(&self) -> &[u8; KEY_SIZE] {
        &self.encryption_key
    }

    /// Returns the HMAC key.
    #[must_use]
    pub fn hmac_key(&self) -> &[u8; KEY_SIZE] {
        &self.hmac_key
    }

    /// Encodes the bundle as a `(encryption, hmac)` base64 pair for the
    /// `crypto/keys` record body.
    #[must_use]
    pub fn to_b64_pair(&self) -> (String, String) {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        (
            STANDARD.encode(self.encryption_key),
            STANDARD.encode(self.hmac_key),
        )
    }

    /// Decodes a bundle from a `(encryption, hmac)` base64 pair.
    pub fn from_b64_pair(encryption: &str, hmac: &str) -> CryptoResult<Self> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        let enc = STANDARD
            .decode(encryption)
            .map_err(|e| CryptoError::invalid_encoding(format!("encryption key: {e}")))?;
        let mac = STANDARD
            .decode(hmac)
            .map_err(|e| CryptoError::invalid_encoding(format!("hmac key: {e}")))?;
        Self::from_bytes(&enc, &mac)
    }
}

impl PartialEq for KeyBundle {
    fn eq(&self, other: &Self) -> bool {
        // Not constant-time; only used by tests and key-cache comparisons,
        // never to verify attacker-controlled input.
        self.encryption_key == other.encryption_key && self.hmac_key == other.hmac_key
    }
}

impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundle")
            .field("encryption_key", &"[REDACTED]")
            .field("hmac_key", &"[REDACTED]")
            .finish()
    }
}

/// Per-collection key bundles with a default fallback.
///
/// Must be fully populated before any non-meta collection is fetched or
/// stored. Cleared and regenerated atomically during a fresh start.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionKeys {
    default: KeyBundle,
    collections: HashMap<String, KeyBundle>,
}

impl CollectionKeys {
    /// Generates a fresh set with a random default bundle and no
    /// per-collection overrides.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            default: KeyBundle::generate(),
            collections: HashMap::new(),
        }
    }

    /// Creates a set from an explicit default bundle.
    #[must_use]
    pub fn with_default(default: KeyBundle) -> Self {
        Self {
            default,
            collections: HashMap::new(),
        }
    }

    /// Returns the default bundle.
    #[must_use]
    pub fn default_bundle(&self) -> &KeyBundle {
        &self.default
    }

    /// Returns the bundle for a collection, falling back to the default.
    #[must_use]
    pub fn key_for_collection(&self, collection: &str) -> &KeyBundle {
        self.collections.get(collection).unwrap_or(&self.default)
    }

    /// Installs a dedicated bundle for one collection.
    pub fn set_key_for_collection(&mut self, collection: impl Into<String>, bundle: KeyBundle) {
        self.collections.insert(collection.into(), bundle);
    }

    /// Iterates over the per-collection overrides.
    pub fn overrides(&self) -> impl Iterator<Item = (&str, &KeyBundle)> {
        self.collections.iter().map(|(k, v)| (k.as_str(), v))
    }
}
