//! The encrypted `crypto/keys` record.

use crate::envelope::RecordEnvelope;
use crate::error::{ProtocolError, ProtocolResult};
use driftsync_crypto::{CollectionKeys, EncryptedPayload, KeyBundle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire body of `crypto/keys`: the collection key bundles, themselves
/// sealed under the account master bundle before upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysRecord {
    /// Default `(encryption, hmac)` base64 pair.
    pub default: (String, String),
    /// Per-collection overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<String, (String, String)>,
}

impl KeysRecord {
    /// Builds the wire body from in-memory collection keys.
    #[must_use]
    pub fn from_collection_keys(keys: &CollectionKeys) -> Self {
        let collections = keys
            .overrides()
            .map(|(name, bundle)| (name.to_string(), bundle.to_b64_pair()))
            .collect();
        Self {
            default: keys.default_bundle().to_b64_pair(),
            collections,
        }
    }

    /// Reconstructs in-memory collection keys from the wire body.
    pub fn into_collection_keys(&self) -> ProtocolResult<CollectionKeys> {
        let default = KeyBundle::from_b64_pair(&self.default.0, &self.default.1)?;
        let mut keys = CollectionKeys::with_default(default);
        for (name, (enc, mac)) in &self.collections {
            keys.set_key_for_collection(name.clone(), KeyBundle::from_b64_pair(enc, mac)?);
        }
        Ok(keys)
    }

    /// Seals the keys body under the master bundle into the `crypto/keys`
    /// storage envelope.
    pub fn seal(&self, master: &KeyBundle) -> ProtocolResult<RecordEnvelope> {
        let cleartext = serde_json::to_vec(self)?;
        let sealed = EncryptedPayload::seal(&cleartext, master)?;
        Ok(RecordEnvelope {
            id: "keys".into(),
            modified_ms: 0,
            sortindex: 0,
            payload: serde_json::to_string(&sealed)?,
        })
    }

    /// Verifies and opens a downloaded `crypto/keys` envelope.
    pub fn open(envelope: &RecordEnvelope, master: &KeyBundle) -> ProtocolResult<Self> {
        let sealed: EncryptedPayload = serde_json::from_str(&envelope.payload)
            .map_err(|e| ProtocolError::malformed(format!("crypto/keys payload: {e}")))?;
        let cleartext = sealed.open(master)?;
        serde_json::from_slice(&cleartext)
            .map_err(|e| ProtocolError::malformed(format!("crypto/keys body: {e}")))
    }
}
