//! The bookkeeping stages of the pipeline: preconditions, cluster
//! discovery, `info/collections`, `meta/global`, key management, and the
//! terminal stage.

use crate::error::{EngineError, EngineResult};
use crate::session::SessionContext;
use crate::stage::{StageFlow, SyncStage};
use driftsync_client::{HttpClient, HttpRequest, StorageError};
use driftsync_protocol::KeysRecord;
use tracing::{debug, info};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Validates configuration and any server-requested backoff window.
/// Configuration errors never get further into the pipeline than this.
#[derive(Debug, Default)]
pub struct CheckPreconditionsStage;

impl<C: HttpClient> SyncStage<C> for CheckPreconditionsStage {
    fn execute(&mut self, ctx: &mut SessionContext<C>) -> EngineResult<StageFlow> {
        ctx.config.validate()?;
        if let Some(until_ms) = ctx.config.backoff_until_ms {
            if until_ms > now_millis() {
                return Err(EngineError::BackoffInEffect { until_ms });
            }
            ctx.config.backoff_until_ms = None;
        }
        Ok(StageFlow::Continue)
    }
}

/// Discovers the storage node when none is configured, by asking the
/// node-assignment endpoint. The response body is the cluster URL.
#[derive(Debug, Default)]
pub struct EnsureClusterUrlStage;

impl<C: HttpClient> SyncStage<C> for EnsureClusterUrlStage {
    fn execute(&mut self, ctx: &mut SessionContext<C>) -> EngineResult<StageFlow> {
        if ctx.config.cluster_url.is_some() {
            return Ok(StageFlow::Continue);
        }

        let url = ctx
            .config
            .node_assignment_url
            .clone()
            .ok_or(EngineError::NoClusterUrl)?;
        let response = ctx
            .http()
            .execute(HttpRequest::get(url))
            .map_err(StorageError::transport_retryable)
            .map_err(EngineError::Storage)?;
        if !response.is_success() {
            return Err(EngineError::Storage(StorageError::HttpStatus(
                response.status,
            )));
        }

        let cluster = String::from_utf8(response.body)
            .map_err(|_| EngineError::configuration("node assignment body is not UTF-8"))?
            .trim()
            .to_string();
        if cluster.is_empty() {
            return Err(EngineError::configuration("node assignment returned no URL"));
        }

        info!(%cluster, "assigned storage node");
        ctx.config.cluster_url = Some(cluster);
        ctx.config.validate()?;
        Ok(StageFlow::Continue)
    }
}

/// Fetches `info/collections` so later stages can skip collections with
/// no remote work.
#[derive(Debug, Default)]
pub struct FetchInfoCollectionsStage;

impl<C: HttpClient> SyncStage<C> for FetchInfoCollectionsStage {
    fn execute(&mut self, ctx: &mut SessionContext<C>) -> EngineResult<StageFlow> {
        let (info, _timestamp) = ctx.storage()?.get_info_collections()?;
        ctx.info_collections = Some(info);
        Ok(StageFlow::Continue)
    }
}

/// Fetches `meta/global` and lets the session act on it. A node with no
/// meta record at all is a fresh or wiped server and triggers fresh-start.
#[derive(Debug, Default)]
pub struct FetchMetaGlobalStage;

impl<C: HttpClient> SyncStage<C> for FetchMetaGlobalStage {
    fn execute(&mut self, ctx: &mut SessionContext<C>) -> EngineResult<StageFlow> {
        match ctx.storage()?.get_meta_global()? {
            Some((meta, _timestamp)) => ctx.process_meta_global(meta),
            None => {
                info!("no meta/global on server; starting fresh");
                ctx.fresh_start()?;
                Ok(StageFlow::Restart)
            }
        }
    }
}

/// Makes sure collection keys are populated before any collection stage
/// runs: cached keys are kept, otherwise `crypto/keys` is fetched and
/// opened under the master bundle. A missing keys record triggers
/// fresh-start.
#[derive(Debug, Default)]
pub struct EnsureKeysStage;

impl<C: HttpClient> SyncStage<C> for EnsureKeysStage {
    fn execute(&mut self, ctx: &mut SessionContext<C>) -> EngineResult<StageFlow> {
        if ctx.config.collection_keys.is_some() {
            debug!("collection keys already cached");
            return Ok(StageFlow::Continue);
        }

        match ctx.storage()?.get_keys()? {
            Some((envelope, _timestamp)) => {
                // Verification failure here is a hard error: never sync
                // with keys we cannot authenticate.
                let keys = KeysRecord::open(&envelope, &ctx.config.master_bundle)?
                    .into_collection_keys()?;
                ctx.config.collection_keys = Some(keys);
                Ok(StageFlow::Continue)
            }
            None => {
                info!("no crypto/keys on server; starting fresh");
                ctx.fresh_start()?;
                Ok(StageFlow::Restart)
            }
        }
    }
}

/// Terminal stage: wraps the ring back to idle.
#[derive(Debug, Default)]
pub struct CompletedStage;

impl<C: HttpClient> SyncStage<C> for CompletedStage {
    fn execute(&mut self, _ctx: &mut SessionContext<C>) -> EngineResult<StageFlow> {
        info!("sync run complete");
        Ok(StageFlow::Finished)
    }
}
