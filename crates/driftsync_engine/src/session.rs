//! The stage machine driving a sync run.

use crate::clients::ClientsEngineStage;
use crate::collection::CollectionSyncStage;
use crate::config::SyncConfiguration;
use crate::error::{EngineError, EngineResult};
use crate::stage::{Stage, StageFlow, SyncStage};
use crate::stages::{
    CheckPreconditionsStage, CompletedStage, EnsureClusterUrlStage, EnsureKeysStage,
    FetchInfoCollectionsStage, FetchMetaGlobalStage,
};
use driftsync_client::{HttpClient, StorageClient};
use driftsync_crypto::{generate_guid, CollectionKeys, KeyBundle};
use driftsync_protocol::{InfoCollections, KeysRecord, MetaGlobal};
use driftsync_store::Repository;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Storage format version this client reads and writes.
pub const STORAGE_VERSION: u32 = 5;

/// Completion interface of a session. One success or one error event is
/// reported per run, plus a notification as each stage completes.
pub trait SessionCallback: Send + Sync {
    /// The given stage finished and the session is about to advance.
    fn handle_stage_completed(&self, stage: Stage);
    /// The run completed; the session is idle again.
    fn handle_success(&self);
    /// The run aborted with an error; the session stays on the failed
    /// stage for inspection.
    fn handle_error(&self, error: &EngineError);
}

/// The state a stage executes against: configuration plus the shared
/// transport. Threaded explicitly through every stage call; never
/// captured ambiently.
pub struct SessionContext<C> {
    /// Durable sync configuration.
    pub config: SyncConfiguration,
    /// `info/collections` fetched earlier in this run, if any.
    pub info_collections: Option<InfoCollections>,
    http: Arc<C>,
}

impl<C: HttpClient> SessionContext<C> {
    /// Creates a context over the given transport.
    pub fn new(config: SyncConfiguration, http: Arc<C>) -> Self {
        Self {
            config,
            info_collections: None,
            http,
        }
    }

    /// The raw transport, for requests outside the storage URL space
    /// (node assignment).
    pub fn http(&self) -> &Arc<C> {
        &self.http
    }

    /// A storage client for the configured cluster.
    ///
    /// # Errors
    ///
    /// Fails when no cluster URL is known yet.
    pub fn storage(&self) -> EngineResult<StorageClient<C>> {
        let cluster = self
            .config
            .cluster_url
            .as_deref()
            .ok_or(EngineError::NoClusterUrl)?;
        Ok(StorageClient::new(
            Arc::clone(&self.http),
            cluster,
            &self.config.api_version,
            &self.config.username,
        ))
    }

    /// The key bundle for a collection; fails before keys are populated.
    pub fn key_for_collection(&self, collection: &str) -> EngineResult<&KeyBundle> {
        self.config.key_for_collection(collection)
    }

    /// Applies a fetched `meta/global` record.
    ///
    /// - remote storage version lower than ours: the server data is
    ///   outdated; fresh-start and restart
    /// - higher: this client is outdated; fail without destructive action
    /// - sync ID differs: a new epoch; drop timestamps and cached keys,
    ///   adopt the remote sync ID and continue
    pub fn process_meta_global(&mut self, meta: MetaGlobal) -> EngineResult<StageFlow> {
        let Some(remote_version) = meta.storage_version else {
            warn!("meta/global carries no storage version; starting fresh");
            self.fresh_start()?;
            return Ok(StageFlow::Restart);
        };

        if remote_version < STORAGE_VERSION {
            info!(remote_version, "server storage is outdated; starting fresh");
            self.fresh_start()?;
            return Ok(StageFlow::Restart);
        }

        if remote_version > STORAGE_VERSION {
            return Err(EngineError::RequiresUpgrade {
                local: STORAGE_VERSION,
                remote: remote_version,
            });
        }

        let Some(remote_sync_id) = meta.sync_id else {
            warn!("meta/global carries no sync ID; starting fresh");
            self.fresh_start()?;
            return Ok(StageFlow::Restart);
        };

        if self.config.sync_id.as_deref() != Some(remote_sync_id.as_str()) {
            info!(sync_id = %remote_sync_id, "sync ID changed; entering new epoch");
            self.config.begin_new_epoch(remote_sync_id);
        }

        Ok(StageFlow::Continue)
    }

    /// Wipes the server and reinitializes sync identity and keys.
    ///
    /// An explicit sequence of fallible remote steps: wipe, upload the new
    /// `meta/global`, upload the new keys. Local configuration is only
    /// committed once every remote write has been acknowledged, so an
    /// abort anywhere leaves no half-applied local state.
    pub fn fresh_start(&mut self) -> EngineResult<()> {
        let storage = self.storage()?;
        let new_sync_id = generate_guid();
        let new_keys = CollectionKeys::generate();

        storage.delete_all_collections()?;
        storage.put_meta_global(&MetaGlobal::new(new_sync_id.clone(), STORAGE_VERSION))?;
        let keys_envelope =
            KeysRecord::from_collection_keys(&new_keys).seal(&self.config.master_bundle)?;
        storage.put_keys(&keys_envelope)?;

        self.config.begin_new_epoch(new_sync_id);
        self.config.collection_keys = Some(new_keys);
        info!("fresh start complete; server wiped and reinitialized");
        Ok(())
    }
}

/// Outcome of one `advance` step, session-internal.
enum RunFlow {
    Continue,
    Done,
    Aborted,
}

/// A sync session: the stage registry, the current position in the ring,
/// and the callback the outcome is reported through.
///
/// Exactly one session may be active against a given configuration; the
/// session is driven by a single logical thread and `advance` is not
/// re-entrant.
pub struct GlobalSession<C> {
    context: SessionContext<C>,
    stages: BTreeMap<Stage, Box<dyn SyncStage<C>>>,
    current: Stage,
    callback: Arc<dyn SessionCallback>,
}

impl<C: HttpClient + 'static> GlobalSession<C> {
    /// Creates a session with the default stage registry, syncing the
    /// `clients` and `bookmarks` collections against the given local
    /// repositories.
    ///
    /// # Errors
    ///
    /// Fails fast with a configuration error before any stage runs.
    pub fn new(
        config: SyncConfiguration,
        http: Arc<C>,
        clients: Box<dyn Repository>,
        bookmarks: Box<dyn Repository>,
        callback: Arc<dyn SessionCallback>,
    ) -> EngineResult<Self> {
        let mut stages: BTreeMap<Stage, Box<dyn SyncStage<C>>> = BTreeMap::new();
        stages.insert(Stage::CheckPreconditions, Box::new(CheckPreconditionsStage));
        stages.insert(Stage::EnsureClusterUrl, Box::new(EnsureClusterUrlStage));
        stages.insert(
            Stage::FetchInfoCollections,
            Box::new(FetchInfoCollectionsStage),
        );
        stages.insert(Stage::FetchMetaGlobal, Box::new(FetchMetaGlobalStage));
        stages.insert(Stage::EnsureKeys, Box::new(EnsureKeysStage));
        stages.insert(
            Stage::SyncClientsEngine,
            Box::new(ClientsEngineStage::new(clients)),
        );
        stages.insert(
            Stage::SyncBookmarks,
            Box::new(CollectionSyncStage::new("bookmarks", bookmarks)),
        );
        stages.insert(Stage::Completed, Box::new(CompletedStage));
        Self::with_stages(config, http, stages, callback)
    }

    /// Creates a session with an explicit stage registry. A registry
    /// missing a stage fails the run with `NoSuchStage` when the ring
    /// reaches it.
    pub fn with_stages(
        config: SyncConfiguration,
        http: Arc<C>,
        stages: BTreeMap<Stage, Box<dyn SyncStage<C>>>,
        callback: Arc<dyn SessionCallback>,
    ) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            context: SessionContext::new(config, http),
            stages,
            current: Stage::Idle,
            callback,
        })
    }

    /// The stage the session is currently on.
    #[must_use]
    pub fn current_stage(&self) -> Stage {
        self.current
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfiguration {
        &self.context.config
    }

    /// Mutable access to the configuration, for restoring persisted state
    /// between runs. Callers must not mutate it while a run is in flight.
    pub fn config_mut(&mut self) -> &mut SyncConfiguration {
        &mut self.context.config
    }

    /// Begins a sync run.
    ///
    /// The caller is responsible for being online and respecting any
    /// scheduler-level backoff before calling this.
    ///
    /// # Errors
    ///
    /// `AlreadySyncing` if the session is not idle. Stage failures do not
    /// surface here; they are reported through the callback as exactly one
    /// error event. Only programming errors (an incomplete stage registry)
    /// are returned.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.current != Stage::Idle {
            return Err(EngineError::AlreadySyncing(self.current));
        }
        self.run()
    }

    fn run(&mut self) -> EngineResult<()> {
        loop {
            match self.advance() {
                Ok(RunFlow::Continue) => continue,
                Ok(RunFlow::Done | RunFlow::Aborted) => return Ok(()),
                Err(fatal) => {
                    // Incomplete registry: fatal, not retried.
                    self.callback.handle_error(&fatal);
                    return Err(fatal);
                }
            }
        }
    }

    /// Moves to the next stage in the ring and executes it. Any error
    /// escaping the stage is caught here and converted into an abort; it
    /// never propagates out.
    fn advance(&mut self) -> EngineResult<RunFlow> {
        self.callback.handle_stage_completed(self.current);
        let next = self.current.next();
        let stage = self
            .stages
            .get_mut(&next)
            .ok_or(EngineError::NoSuchStage(next))?;
        self.current = next;
        info!(stage = ?next, "running next stage");

        match stage.execute(&mut self.context) {
            Ok(StageFlow::Continue) => Ok(RunFlow::Continue),
            Ok(StageFlow::Finished) => {
                self.complete_sync();
                Ok(RunFlow::Done)
            }
            Ok(StageFlow::Restart) => {
                self.restart()?;
                Ok(RunFlow::Done)
            }
            Err(error) => {
                self.abort(&error, "uncaught error in stage");
                Ok(RunFlow::Aborted)
            }
        }
    }

    /// Resets to idle and reports success. Reached only from the
    /// `Completed` stage.
    fn complete_sync(&mut self) {
        self.current = Stage::Idle;
        self.callback.handle_success();
    }

    /// Resets to idle and runs the whole pipeline again, with whatever
    /// the fresh start just bootstrapped.
    fn restart(&mut self) -> EngineResult<()> {
        info!("restarting sync from idle");
        self.current = Stage::Idle;
        self.run()
    }

    /// Reports the error and stops advancing. The current stage is left
    /// unchanged so the caller can inspect where the run failed.
    fn abort(&mut self, error: &EngineError, reason: &str) {
        warn!(%error, reason, stage = ?self.current, "aborting sync");
        self.callback.handle_error(error);
    }

    /// Returns an aborted session to idle so a later run can start. Does
    /// not touch configuration or local stores.
    pub fn reset_to_idle(&mut self) {
        self.current = Stage::Idle;
    }
}
