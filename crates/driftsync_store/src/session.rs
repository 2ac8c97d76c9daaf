//! Repository session contracts.

use crate::error::StoreResult;
use driftsync_records::Record;
use std::collections::BTreeSet;

/// A local record store the engine can open sync sessions against.
pub trait Repository: Send + Sync {
    /// Opens a session with the last-sync timestamp fixed for its lifetime.
    fn create_session(&self, last_sync_ms: i64) -> StoreResult<Box<dyn RepositorySession>>;
}

/// One sync pass over a local record store.
///
/// All operations are driven by the engine's single logical thread;
/// implementations may hop to worker threads internally but must not
/// return until the operation's outcome is known. The session's last-sync
/// timestamp is fixed at open time.
pub trait RepositorySession: Send {
    /// Ids of all locally-held records (including tombstones) modified at
    /// or after `timestamp_ms`.
    fn guids_since(&self, timestamp_ms: i64) -> StoreResult<BTreeSet<String>>;

    /// Full records modified at or after `timestamp_ms`.
    fn fetch_since(&self, timestamp_ms: i64) -> StoreResult<Vec<Record>>;

    /// Fetches records by id.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::InvalidRequest`](crate::StoreError) if
    /// `ids` is empty.
    fn fetch(&self, ids: &[String]) -> StoreResult<Vec<Record>>;

    /// Full local snapshot. Diagnostic and testing use.
    fn fetch_all(&self) -> StoreResult<Vec<Record>>;

    /// Stores an incoming record, reconciling against any local version.
    ///
    /// Exactly one of insert-new, replace-with-remote, or
    /// replace-with-reconciled occurs, and the returned record is the one
    /// that actually ended up stored (which may differ from `incoming` if
    /// reconciliation chose the other side).
    fn store(&mut self, incoming: Record) -> StoreResult<Record>;

    /// Deletes all local records unconditionally.
    fn wipe(&mut self) -> StoreResult<()>;

    /// Starts a sync pass. No-op for non-transactional backends.
    fn begin(&mut self) -> StoreResult<()> {
        Ok(())
    }

    /// Ends a sync pass. No-op for non-transactional backends.
    fn finish(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
