//! The encrypted record envelope.

use crate::error::{ProtocolError, ProtocolResult};
use crate::timestamp;
use driftsync_crypto::{EncryptedPayload, KeyBundle};
use driftsync_records::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record as it travels on the wire: outer metadata in the clear, the
/// record body sealed inside the stringified `payload` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    /// Record GUID.
    pub id: String,
    /// Server modification time (decimal seconds on the wire).
    #[serde(rename = "modified", with = "timestamp::decimal_seconds", default)]
    pub modified_ms: i64,
    /// Server-assigned sort hint.
    #[serde(default)]
    pub sortindex: i64,
    /// Stringified payload body. Encrypted for normal collections; plain
    /// JSON for `meta/global`.
    pub payload: String,
}

/// Cleartext body of a sealed record payload.
#[derive(Debug, Serialize, Deserialize)]
struct InnerBody {
    id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    deleted: bool,
    #[serde(default)]
    payload: Value,
}

impl RecordEnvelope {
    /// Seals a record's body under the collection bundle.
    pub fn seal(record: &Record, bundle: &KeyBundle) -> ProtocolResult<Self> {
        let inner = InnerBody {
            id: record.id.clone(),
            deleted: record.deleted,
            payload: record.payload.clone(),
        };
        let cleartext = serde_json::to_vec(&inner)?;
        let sealed = EncryptedPayload::seal(&cleartext, bundle)?;
        Ok(Self {
            id: record.id.clone(),
            modified_ms: record.last_modified,
            sortindex: record.sortindex,
            payload: serde_json::to_string(&sealed)?,
        })
    }

    /// Verifies and decrypts the envelope into a record of `collection`.
    ///
    /// # Errors
    ///
    /// Fails hard on HMAC mismatch or decryption failure, and on an inner
    /// id that disagrees with the envelope id.
    pub fn open(&self, collection: &str, bundle: &KeyBundle) -> ProtocolResult<Record> {
        let sealed: EncryptedPayload = serde_json::from_str(&self.payload)
            .map_err(|e| ProtocolError::malformed(format!("encrypted payload: {e}")))?;
        let cleartext = sealed.open(bundle)?;
        let inner: InnerBody = serde_json::from_slice(&cleartext)
            .map_err(|e| ProtocolError::malformed(format!("record body: {e}")))?;

        if inner.id != self.id {
            return Err(ProtocolError::IdMismatch {
                outer: self.id.clone(),
                inner: inner.id,
            });
        }

        Ok(Record {
            id: inner.id,
            collection: collection.to_string(),
            payload: inner.payload,
            last_modified: self.modified_ms,
            sortindex: self.sortindex,
            deleted: inner.deleted,
            local_id: None,
        })
    }

    /// Parses one line of an `application/newlines` collection fetch.
    pub fn from_json_line(line: &str) -> ProtocolResult<Self> {
        serde_json::from_str(line).map_err(|e| ProtocolError::malformed(format!("envelope: {e}")))
    }

    /// Renders the envelope as a single JSON line.
    pub fn to_json_line(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
