//! In-memory repository implementation.

use crate::error::{StoreError, StoreResult};
use crate::session::{Repository, RepositorySession};
use driftsync_records::Record;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, Record>,
    next_local_id: u64,
}

impl Inner {
    fn assign_local_id(&mut self) -> u64 {
        self.next_local_id += 1;
        self.next_local_id
    }
}

/// An in-memory record store.
///
/// Assigns monotonically increasing local row handles, the local-only
/// identifier the reconciler preserves across replacements.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, bypassing reconciliation. Test setup use.
    pub fn seed(&self, mut record: Record) {
        let mut inner = self.inner.write();
        if record.local_id.is_none() {
            record.local_id = Some(inner.assign_local_id());
        }
        inner.records.insert(record.id.clone(), record);
    }

    /// Number of live and tombstoned records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Fetches one record by id, if present.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Record> {
        self.inner.read().records.get(id).cloned()
    }
}

impl Repository for MemoryRepository {
    fn create_session(&self, last_sync_ms: i64) -> StoreResult<Box<dyn RepositorySession>> {
        Ok(Box::new(MemoryRepositorySession {
            inner: Arc::clone(&self.inner),
            last_sync_ms,
        }))
    }
}

/// A sync pass over a [`MemoryRepository`].
#[derive(Debug)]
pub struct MemoryRepositorySession {
    inner: Arc<RwLock<Inner>>,
    last_sync_ms: i64,
}

impl RepositorySession for MemoryRepositorySession {
    fn guids_since(&self, timestamp_ms: i64) -> StoreResult<BTreeSet<String>> {
        Ok(self
            .inner
            .read()
            .records
            .values()
            .filter(|record| record.last_modified >= timestamp_ms)
            .map(|record| record.id.clone())
            .collect())
    }

    fn fetch_since(&self, timestamp_ms: i64) -> StoreResult<Vec<Record>> {
        Ok(self
            .inner
            .read()
            .records
            .values()
            .filter(|record| record.last_modified >= timestamp_ms)
            .cloned()
            .collect())
    }

    fn fetch(&self, ids: &[String]) -> StoreResult<Vec<Record>> {
        if ids.is_empty() {
            return Err(StoreError::invalid_request("fetch with no ids"));
        }
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect())
    }

    fn fetch_all(&self) -> StoreResult<Vec<Record>> {
        Ok(self.inner.read().records.values().cloned().collect())
    }

    fn store(&mut self, mut incoming: Record) -> StoreResult<Record> {
        let mut inner = self.inner.write();

        let Some(existing) = inner.records.get(&incoming.id).cloned() else {
            // New record: insert directly.
            incoming.local_id = Some(inner.assign_local_id());
            inner.records.insert(incoming.id.clone(), incoming.clone());
            return Ok(incoming);
        };

        let stored = if existing.last_modified > self.last_sync_ms {
            // Both sides changed since the last sync: a true conflict.
            // Last writer wins on the whole record; the surviving copy
            // keeps the local row handle so local linkage survives.
            let mut winner = if existing.last_modified > incoming.last_modified {
                existing.clone()
            } else {
                incoming
            };
            winner.local_id = existing.local_id;
            winner
        } else {
            // Only the remote side moved: the incoming record wins
            // outright, keeping the local row handle.
            incoming.local_id = existing.local_id;
            incoming
        };

        // Replace atomically: whole-row delete-then-insert, never a partial
        // field update.
        inner.records.remove(&existing.id);
        inner.records.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn wipe(&mut self) -> StoreResult<()> {
        self.inner.write().records.clear();
        Ok(())
    }
}
