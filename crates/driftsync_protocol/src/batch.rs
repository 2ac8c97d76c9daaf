//! The bulk-upload response body.

use crate::error::{ProtocolError, ProtocolResult};
use crate::timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response body of a bulk POST to a collection:
/// `{"modified": <decimal seconds>, "success": [ids], "failed": {id: [reasons]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Server timestamp the accepted records were stamped with.
    #[serde(rename = "modified", with = "timestamp::decimal_seconds")]
    pub modified_ms: i64,
    /// Ids accepted by the server.
    #[serde(default)]
    pub success: Vec<String>,
    /// Ids rejected by the server, with reasons.
    #[serde(default)]
    pub failed: BTreeMap<String, Vec<String>>,
}

impl BatchResults {
    /// Parses a bulk POST response body.
    pub fn from_slice(body: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(body)
            .map_err(|e| ProtocolError::malformed(format!("batch results: {e}")))
    }

    /// Returns true if every posted record was accepted.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}
