//! Durable configuration snapshots.
//!
//! The engine does not own a storage medium; it hands the embedder a JSON
//! blob to keep and takes it back on the next launch. Collection keys are
//! sealed under the account master bundle inside the blob, so the blob
//! alone never exposes key material.

use crate::config::SyncConfiguration;
use crate::error::EngineResult;
use driftsync_protocol::{KeysRecord, RecordEnvelope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything a configuration needs to survive a process restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Sync epoch identity.
    pub sync_id: Option<String>,
    /// Per-collection high-water marks, milliseconds.
    pub last_syncs: BTreeMap<String, i64>,
    /// Server timestamp of our own clients record.
    pub client_record_timestamp_ms: i64,
    /// Stable installation identity.
    pub device_id: Uuid,
    /// Advertised device name.
    pub device_name: String,
    /// Advertised device type.
    pub device_type: String,
    /// GUID of our record in the `clients` collection.
    pub account_guid: String,
    /// Collection keys sealed under the master bundle, if populated.
    pub keys: Option<RecordEnvelope>,
}

impl PersistedState {
    /// Serializes the state to a JSON blob.
    pub fn to_json(&self) -> EngineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a JSON blob produced by [`to_json`](Self::to_json).
    pub fn from_json(blob: &[u8]) -> EngineResult<Self> {
        Ok(serde_json::from_slice(blob)?)
    }
}

impl SyncConfiguration {
    /// Snapshots the durable parts of this configuration.
    pub fn snapshot(&self) -> EngineResult<PersistedState> {
        let keys = match &self.collection_keys {
            Some(keys) => Some(KeysRecord::from_collection_keys(keys).seal(&self.master_bundle)?),
            None => None,
        };
        Ok(PersistedState {
            sync_id: self.sync_id.clone(),
            last_syncs: self.last_syncs.clone(),
            client_record_timestamp_ms: self.client_record_timestamp_ms,
            device_id: self.device_id,
            device_name: self.device_name.clone(),
            device_type: self.device_type.clone(),
            account_guid: self.account_guid.clone(),
            keys,
        })
    }

    /// Restores a snapshot into this configuration. The master bundle must
    /// be the one the snapshot was taken under, or the sealed keys fail
    /// verification.
    pub fn restore(&mut self, state: PersistedState) -> EngineResult<()> {
        let keys = match &state.keys {
            Some(envelope) => Some(
                KeysRecord::open(envelope, &self.master_bundle)?.into_collection_keys()?,
            ),
            None => None,
        };
        self.sync_id = state.sync_id;
        self.last_syncs = state.last_syncs;
        self.client_record_timestamp_ms = state.client_record_timestamp_ms;
        self.device_id = state.device_id;
        self.device_name = state.device_name;
        self.device_type = state.device_type;
        self.account_guid = state.account_guid;
        self.collection_keys = keys;
        Ok(())
    }
}
