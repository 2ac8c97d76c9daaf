//! Durable session configuration.

use crate::error::{EngineError, EngineResult};
use driftsync_crypto::{generate_guid, CollectionKeys, KeyBundle};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Process-durable sync state: account identity, cluster coordinates,
/// per-collection high-water marks, sync identity and key material.
///
/// Owned exclusively by one active session at a time; mutated only by the
/// stage machine and the stage currently executing.
#[derive(Debug, Clone)]
pub struct SyncConfiguration {
    /// Account username.
    pub username: String,
    /// Storage node base URL, once known.
    pub cluster_url: Option<String>,
    /// Endpoint that assigns a storage node when none is configured.
    pub node_assignment_url: Option<String>,
    /// Storage API version segment of every URL.
    pub api_version: String,
    /// Identity of the server data epoch we last synced against.
    pub sync_id: Option<String>,
    /// Account master key bundle; collection keys are sealed under it.
    pub master_bundle: KeyBundle,
    /// Collection key cache. Cleared on epoch change, repopulated by the
    /// key-management stage.
    pub collection_keys: Option<CollectionKeys>,
    /// Per-collection last-sync high-water marks, milliseconds.
    pub last_syncs: BTreeMap<String, i64>,
    /// Server timestamp of our own `clients` record, milliseconds. Zero
    /// when the record is unknown or missing server-side.
    pub client_record_timestamp_ms: i64,
    /// Stable identity of this installation.
    pub device_id: Uuid,
    /// Human-readable device name advertised in the `clients` collection.
    pub device_name: String,
    /// Device form factor advertised in the `clients` collection.
    pub device_type: String,
    /// GUID of our own record in the `clients` collection.
    pub account_guid: String,
    /// End of a server-requested backoff window, if any.
    pub backoff_until_ms: Option<i64>,
}

impl SyncConfiguration {
    /// Creates a configuration for `username` with the given master bundle.
    pub fn new(username: impl Into<String>, master_bundle: KeyBundle) -> Self {
        Self {
            username: username.into(),
            cluster_url: None,
            node_assignment_url: None,
            api_version: "1.1".into(),
            sync_id: None,
            master_bundle,
            collection_keys: None,
            last_syncs: BTreeMap::new(),
            client_record_timestamp_ms: 0,
            device_id: Uuid::new_v4(),
            device_name: "driftsync device".into(),
            device_type: "desktop".into(),
            account_guid: generate_guid(),
            backoff_until_ms: None,
        }
    }

    /// Sets the cluster URL.
    #[must_use]
    pub fn with_cluster_url(mut self, url: impl Into<String>) -> Self {
        self.cluster_url = Some(url.into());
        self
    }

    /// Sets the node-assignment endpoint.
    #[must_use]
    pub fn with_node_assignment_url(mut self, url: impl Into<String>) -> Self {
        self.node_assignment_url = Some(url.into());
        self
    }

    /// Sets the advertised device name.
    #[must_use]
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Sets the advertised device type.
    #[must_use]
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Validates the configuration. Called at session construction so bad
    /// credentials or URLs never enter the stage pipeline.
    pub fn validate(&self) -> EngineResult<()> {
        if self.username.trim().is_empty() {
            return Err(EngineError::configuration("username is empty"));
        }
        if let Some(url) = &self.cluster_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(EngineError::configuration(format!(
                    "cluster URL is not absolute: {url:?}"
                )));
            }
        }
        if self.cluster_url.is_none() && self.node_assignment_url.is_none() {
            return Err(EngineError::configuration(
                "neither cluster URL nor node assignment URL is set",
            ));
        }
        if self.account_guid.is_empty() {
            return Err(EngineError::configuration("account GUID is empty"));
        }
        Ok(())
    }

    /// Last-sync high-water mark for a collection; zero when never synced.
    #[must_use]
    pub fn last_sync_for(&self, collection: &str) -> i64 {
        self.last_syncs.get(collection).copied().unwrap_or(0)
    }

    /// Persists a collection's new high-water mark. Callers must only do
    /// this after the corresponding local commits have landed.
    pub fn set_last_sync(&mut self, collection: impl Into<String>, millis: i64) {
        self.last_syncs.insert(collection.into(), millis);
    }

    /// Enters a new sync epoch: adopts `sync_id`, clears every
    /// per-collection timestamp and drops the collection key cache.
    pub fn begin_new_epoch(&mut self, sync_id: impl Into<String>) {
        self.sync_id = Some(sync_id.into());
        self.last_syncs.clear();
        self.client_record_timestamp_ms = 0;
        self.collection_keys = None;
    }

    /// The key bundle for a collection.
    ///
    /// # Errors
    ///
    /// Fails when collection keys have not been populated yet; collection
    /// stages must never run before the key-management stage.
    pub fn key_for_collection(&self, collection: &str) -> EngineResult<&KeyBundle> {
        self.collection_keys
            .as_ref()
            .map(|keys| keys.key_for_collection(collection))
            .ok_or(EngineError::NoCollectionKeys)
    }
}
