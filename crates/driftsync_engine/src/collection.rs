//! Generic per-collection sync: download, reconcile, upload.

use crate::error::EngineResult;
use crate::session::SessionContext;
use crate::stage::{StageFlow, SyncStage};
use driftsync_client::HttpClient;
use driftsync_protocol::RecordEnvelope;
use driftsync_records::Record;
use driftsync_store::{Repository, RepositorySession as _};
use tracing::{debug, warn};

/// Syncs one record collection against its local repository:
/// download changed records through the reconciling store, then upload
/// locally-changed records in bulk, then move the high-water mark.
pub struct CollectionSyncStage {
    collection: String,
    local: Box<dyn Repository>,
}

impl CollectionSyncStage {
    /// Creates a stage syncing `collection` against `local`.
    pub fn new(collection: impl Into<String>, local: Box<dyn Repository>) -> Self {
        Self {
            collection: collection.into(),
            local,
        }
    }

    /// The collection this stage syncs.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl<C: HttpClient> SyncStage<C> for CollectionSyncStage {
    fn execute(&mut self, ctx: &mut SessionContext<C>) -> EngineResult<StageFlow> {
        let bundle = ctx.key_for_collection(&self.collection)?.clone();
        let last_sync = ctx.config.last_sync_for(&self.collection);

        let mut session = self.local.create_session(last_sync)?;
        session.begin()?;

        let local_changes = session.guids_since(last_sync)?;
        let remote_changed = ctx
            .info_collections
            .as_ref()
            .map(|info| info.changed_since(&self.collection, last_sync))
            // Without info/collections we cannot rule work out.
            .unwrap_or(true);

        if !remote_changed && local_changes.is_empty() {
            debug!(collection = %self.collection, "no work; skipping");
            session.finish()?;
            return Ok(StageFlow::Continue);
        }

        // Capture outgoing records before applying remote ones, so records
        // reconciled this run are not echoed straight back up.
        let outgoing: Vec<Record> = session.fetch_since(last_sync)?;

        let storage = ctx.storage()?;
        let mut high_water = last_sync;

        if remote_changed {
            let fetched = storage.get_collection(
                &self.collection,
                (last_sync > 0).then_some(last_sync),
                true,
            )?;
            debug!(
                collection = %self.collection,
                records = fetched.envelopes.len(),
                "applying remote records"
            );
            for envelope in &fetched.envelopes {
                let record = envelope.open(&self.collection, &bundle)?;
                session.store(record)?;
            }
            high_water = high_water.max(fetched.server_timestamp_ms);
        }

        if !outgoing.is_empty() {
            let envelopes = outgoing
                .iter()
                .map(|record| RecordEnvelope::seal(record, &bundle))
                .collect::<Result<Vec<_>, _>>()?;
            let (results, timestamp) = storage.post_records(&self.collection, &envelopes)?;
            if !results.all_succeeded() {
                // Rejected records stay dirty locally and retry next run.
                warn!(
                    collection = %self.collection,
                    failed = results.failed.len(),
                    "server rejected some uploaded records"
                );
            }
            high_water = high_water.max(timestamp);
        }

        session.finish()?;
        // Local commits are done; only now does the high-water mark move.
        ctx.config.set_last_sync(&self.collection, high_water);
        Ok(StageFlow::Continue)
    }
}

impl std::fmt::Debug for CollectionSyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionSyncStage")
            .field("collection", &self.collection)
            .finish()
    }
}
