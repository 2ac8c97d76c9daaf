//! Sync GUID generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

/// Generates a 12-character record GUID.
///
/// GUIDs are the URL-safe base64 encoding of 9 random bytes, matching the
/// identifier format the storage service expects in record URLs.
#[must_use]
pub fn generate_guid() -> String {
    let mut bytes = [0u8; 9];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
