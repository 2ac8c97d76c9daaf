//! Error types for the sync engine.

use crate::stage::Stage;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while driving a sync session.
#[derive(Error, Debug)]
pub enum EngineError {
    /// `start` was called while a sync was already in flight.
    #[error("already syncing: current stage is {0:?}")]
    AlreadySyncing(Stage),

    /// The stage registry has no entry for a stage. A programming error;
    /// never retried.
    #[error("no stage registered for {0:?}")]
    NoSuchStage(Stage),

    /// The session configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The server asked us to back off and the window has not elapsed.
    #[error("server backoff in effect until {until_ms}")]
    BackoffInEffect {
        /// End of the backoff window, milliseconds since the epoch.
        until_ms: i64,
    },

    /// The server data was written by a newer client; syncing would
    /// corrupt it. No destructive action is taken.
    #[error("client requires upgrade: server storage version {remote}, supported {local}")]
    RequiresUpgrade {
        /// Storage version this client supports.
        local: u32,
        /// Storage version found on the server.
        remote: u32,
    },

    /// A collection stage ran before collection keys were available.
    #[error("collection keys are not set")]
    NoCollectionKeys,

    /// No cluster URL is known and none could be discovered.
    #[error("no cluster URL available")]
    NoClusterUrl,

    /// Another device wrote our record first (HTTP 412). Non-fatal for
    /// this run; the next run re-fetches and reconciles.
    #[error("upload collision on {collection}: another device wrote first")]
    UploadCollision {
        /// Collection the collision happened in.
        collection: String,
    },

    /// Storage service failure.
    #[error(transparent)]
    Storage(#[from] driftsync_client::StorageError),

    /// Local store failure.
    #[error(transparent)]
    Store(#[from] driftsync_store::StoreError),

    /// Wire protocol failure.
    #[error(transparent)]
    Protocol(#[from] driftsync_protocol::ProtocolError),

    /// Crypto failure.
    #[error(transparent)]
    Crypto(#[from] driftsync_crypto::CryptoError),

    /// Record model failure.
    #[error(transparent)]
    Records(#[from] driftsync_records::RecordsError),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
