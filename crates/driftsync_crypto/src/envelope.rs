//! Authenticated encryption of record payloads.
//!
//! The wire body of an encrypted record is a JSON object
//! `{"ciphertext": <base64>, "IV": <base64>, "hmac": <hex>}`. The HMAC is
//! computed with the bundle's MAC key over the base64 ciphertext string and
//! must verify before any decryption is attempted.

use crate::bundle::KeyBundle;
use crate::error::{CryptoError, CryptoResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

type HmacSha256 = Hmac<Sha256>;

/// The encrypted wire body of a record payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Base64-encoded ciphertext.
    pub ciphertext: String,
    /// Base64-encoded nonce.
    #[serde(rename = "IV")]
    pub iv: String,
    /// Hex-encoded HMAC-SHA256 over the base64 ciphertext.
    pub hmac: String,
}

impl EncryptedPayload {
    /// Encrypts and authenticates `plaintext` under `bundle`.
    pub fn seal(plaintext: &[u8], bundle: &KeyBundle) -> CryptoResult<Self> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(bundle.encryption_key()));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let ciphertext_b64 = STANDARD.encode(&ciphertext);
        let hmac = hex_encode(&compute_hmac(bundle, ciphertext_b64.as_bytes())?);

        Ok(Self {
            ciphertext: ciphertext_b64,
            iv: STANDARD.encode(nonce_bytes),
            hmac,
        })
    }

    /// Verifies the HMAC and decrypts the payload.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::HmacMismatch`] if the MAC does not verify
    /// (wrong bundle, or tampering); this is checked before decryption so a
    /// mismatched bundle can never silently yield wrong bytes.
    pub fn open(&self, bundle: &KeyBundle) -> CryptoResult<Vec<u8>> {
        let expected = hex_decode(&self.hmac)?;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(bundle.hmac_key())
            .map_err(|_| CryptoError::KeyDerivation("bad HMAC key length".into()))?;
        mac.update(self.ciphertext.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| CryptoError::HmacMismatch)?;

        let ciphertext = STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| CryptoError::invalid_encoding(format!("ciphertext: {e}")))?;
        let nonce_bytes = STANDARD
            .decode(&self.iv)
            .map_err(|e| CryptoError::invalid_encoding(format!("IV: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::invalid_encoding(format!(
                "IV must be {NONCE_SIZE} bytes, got {}",
                nonce_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(bundle.encryption_key()));
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

fn compute_hmac(bundle: &KeyBundle, data: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(bundle.hmac_key())
        .map_err(|_| CryptoError::KeyDerivation("bad HMAC key length".into()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn hex_decode(s: &str) -> CryptoResult<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(CryptoError::invalid_encoding("odd-length hex"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| CryptoError::invalid_encoding("bad hex digit"))
        })
        .collect()
}
