//! # driftsync engine
//!
//! The multi-stage sync state machine.
//!
//! A [`GlobalSession`] drives an ordered ring of stages: precondition
//! checks, cluster discovery, `info/collections`, `meta/global`
//! processing, key management, the per-collection sync stages, and
//! completion. Stages execute one at a time on a single logical thread of
//! control; any error escaping a stage is caught at the session boundary
//! and converted into exactly one error event per run.
//!
//! ## Key Invariants
//!
//! - Stage order is total per run; `Completed` wraps back to `Idle`
//! - Collection keys are populated before any collection stage runs
//! - A collection's high-water mark moves only after local commits
//! - Fresh start never half-commits local configuration
//! - Whole-record last-writer-wins; no field-level merge

mod clients;
mod collection;
mod commands;
mod config;
mod error;
mod persist;
mod session;
mod stage;
mod stages;

pub use clients::{
    ClientsEngineStage, CLIENTS_COLLECTION, CLIENTS_TTL_REFRESH_MS, MAX_UPLOAD_FAILURE_COUNT,
};
pub use collection::CollectionSyncStage;
pub use commands::{CommandProcessor, CommandRunner, DisplayUriRunner, WipeEngineRunner};
pub use config::SyncConfiguration;
pub use error::{EngineError, EngineResult};
pub use persist::PersistedState;
pub use session::{GlobalSession, SessionCallback, SessionContext, STORAGE_VERSION};
pub use stage::{Stage, StageFlow, SyncStage};
pub use stages::{
    CheckPreconditionsStage, CompletedStage, EnsureClusterUrlStage, EnsureKeysStage,
    FetchInfoCollectionsStage, FetchMetaGlobalStage,
};
