//! The `meta/global` compatibility record.

use crate::envelope::RecordEnvelope;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Body of the `meta/global` record.
///
/// `meta/global` is stored in the clear (its payload is plain JSON, not an
/// encrypted envelope) and gates client/server compatibility: a storage
/// version mismatch triggers fresh-start or upgrade-required, and a sync ID
/// change marks a new epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaGlobal {
    /// Identity of the current server data epoch.
    #[serde(rename = "syncID", default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    /// Storage format version the server data was written with.
    #[serde(
        rename = "storageVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub storage_version: Option<u32>,
}

impl MetaGlobal {
    /// Creates a fully-populated meta record.
    pub fn new(sync_id: impl Into<String>, storage_version: u32) -> Self {
        Self {
            sync_id: Some(sync_id.into()),
            storage_version: Some(storage_version),
        }
    }

    /// Parses the record out of its plaintext envelope.
    pub fn from_envelope(envelope: &RecordEnvelope) -> ProtocolResult<Self> {
        serde_json::from_str(&envelope.payload)
            .map_err(|e| ProtocolError::malformed(format!("meta/global: {e}")))
    }

    /// Wraps the record into a plaintext envelope for upload.
    pub fn to_envelope(&self) -> ProtocolResult<RecordEnvelope> {
        Ok(RecordEnvelope {
            id: "global".into(),
            modified_ms: 0,
            sortindex: 0,
            payload: serde_json::to_string(self)?,
        })
    }
}
