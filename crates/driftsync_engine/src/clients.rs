//! The clients engine stage: syncs the `clients` collection and processes
//! inter-device commands.

use crate::commands::{CommandProcessor, DisplayUriRunner, WipeEngineRunner};
use crate::error::{EngineError, EngineResult};
use crate::session::SessionContext;
use crate::stage::{StageFlow, SyncStage};
use crate::stages::now_millis;
use driftsync_client::{HttpClient, StorageError};
use driftsync_crypto::KeyBundle;
use driftsync_protocol::RecordEnvelope;
use driftsync_records::{ClientPayload, Record};
use driftsync_store::{Repository, RepositorySession};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// The collection this stage syncs.
pub const CLIENTS_COLLECTION: &str = "clients";

/// How long an unchanged local client record stays fresh before being
/// re-announced. Bounds how often an unchanged record is re-uploaded.
pub const CLIENTS_TTL_REFRESH_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Upload retry budget. The attempt counter keeps counting past this so
/// sustained failure stays visible.
pub const MAX_UPLOAD_FAILURE_COUNT: u32 = 5;

/// Syncs the `clients` collection: downloads peer records, processes any
/// commands addressed to this device, and re-uploads our own record when
/// needed.
///
/// State-free between runs except for the upload attempt counter and the
/// commands-processed flag.
pub struct ClientsEngineStage {
    local: Box<dyn Repository>,
    processor: CommandProcessor,
    wipe_flag: Arc<AtomicBool>,
    commands_processed_should_upload: bool,
    upload_attempts: Arc<AtomicU32>,
}

impl ClientsEngineStage {
    /// Creates the stage over a local clients store, with the built-in
    /// command runners registered.
    pub fn new(local: Box<dyn Repository>) -> Self {
        let wipe_flag = Arc::new(AtomicBool::new(false));
        let mut processor = CommandProcessor::new();
        processor.register_command("displayURI", Box::new(DisplayUriRunner));
        processor.register_command(
            "wipeEngine",
            Box::new(WipeEngineRunner::new(Arc::clone(&wipe_flag))),
        );
        Self {
            local,
            processor,
            wipe_flag,
            commands_processed_should_upload: false,
            upload_attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Replaces the command registry, e.g. to add embedder commands.
    pub fn set_processor(&mut self, processor: CommandProcessor) {
        self.processor = processor;
    }

    /// A shared handle on the upload attempt counter, for observability.
    #[must_use]
    pub fn upload_attempts_handle(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.upload_attempts)
    }

    /// True if the local client record must be uploaded this run: either
    /// commands were processed, or the record on the server is older than
    /// the refresh window (or missing entirely).
    fn should_upload(&self, now_ms: i64, record_timestamp_ms: i64) -> bool {
        if self.commands_processed_should_upload {
            return true;
        }
        if record_timestamp_ms == 0 {
            return true;
        }
        now_ms - record_timestamp_ms >= CLIENTS_TTL_REFRESH_MS
    }

    /// Dispatches each downloaded command. Any non-empty batch forces an
    /// upload this run, even if every entry was malformed or unregistered.
    fn process_commands(&mut self, commands: &[Value]) {
        for command in commands {
            if !self.processor.process_command(command) {
                debug!("command ignored");
            }
        }
        if !commands.is_empty() {
            self.commands_processed_should_upload = true;
        }
    }

    /// Stores one downloaded record, wiping the local store first if a
    /// wipe command armed the flag.
    fn wipe_and_store(
        &mut self,
        session: &mut dyn RepositorySession,
        record: Record,
    ) -> EngineResult<()> {
        if self.wipe_flag.swap(false, Ordering::SeqCst) {
            warn!("wiping local clients store before applying server records");
            session.wipe()?;
        }
        session.store(record)?;
        Ok(())
    }

    /// Downloads the full clients collection, decrypting each record. Our
    /// own record is consumed for commands and timestamp bookkeeping; peer
    /// records go through the reconciling store.
    fn download_client_records(
        &mut self,
        ctx: &mut SessionContext<impl HttpClient>,
        bundle: &KeyBundle,
    ) -> EngineResult<()> {
        let last_sync = ctx.config.last_sync_for(CLIENTS_COLLECTION);
        let fetched = ctx
            .storage()?
            .get_collection(CLIENTS_COLLECTION, None, true)?;

        let mut session = self.local.create_session(last_sync)?;
        session.begin()?;

        let mut saw_own_record = false;
        for envelope in &fetched.envelopes {
            let record = envelope.open(CLIENTS_COLLECTION, bundle)?;
            if record.id == ctx.config.account_guid {
                saw_own_record = true;
                ctx.config.client_record_timestamp_ms = record.last_modified;
                let payload = ClientPayload::from_record(&record)?;
                self.process_commands(&payload.commands);
            } else {
                self.wipe_and_store(session.as_mut(), record)?;
            }
        }

        if !saw_own_record {
            // Our record is missing server-side; force a re-upload.
            ctx.config.client_record_timestamp_ms = 0;
        }

        session.finish()?;
        // High-water mark moves only after the stores above committed.
        ctx.config
            .set_last_sync(CLIENTS_COLLECTION, fetched.server_timestamp_ms);
        Ok(())
    }

    /// Builds the canonical local client record fresh from current device
    /// identity.
    fn new_local_client_record(
        &self,
        ctx: &SessionContext<impl HttpClient>,
    ) -> EngineResult<Record> {
        let payload = ClientPayload::new(
            ctx.config.device_name.clone(),
            ctx.config.device_type.clone(),
        );
        Ok(payload
            .into_record(ctx.config.account_guid.clone())?
            .with_last_modified(now_millis()))
    }

    /// Uploads the local client record if [`should_upload`] says so.
    ///
    /// - success: both the record timestamp and the collection high-water
    ///   mark are persisted and the attempt counter resets
    /// - HTTP 412: a collision; never counted against the retry budget
    /// - anything else: the counter grows by exactly one, without a clamp,
    ///   so sustained failure stays observable
    fn check_and_upload(
        &mut self,
        ctx: &mut SessionContext<impl HttpClient>,
        bundle: &KeyBundle,
    ) -> EngineResult<()> {
        if !self.should_upload(now_millis(), ctx.config.client_record_timestamp_ms) {
            debug!("client record is fresh; skipping upload");
            return Ok(());
        }

        let record = self.new_local_client_record(ctx)?;
        let envelope = RecordEnvelope::seal(&record, bundle)?;
        let precondition =
            (ctx.config.client_record_timestamp_ms > 0).then_some(ctx.config.client_record_timestamp_ms);

        match ctx
            .storage()?
            .put_record(CLIENTS_COLLECTION, &envelope, precondition)
        {
            Ok(timestamp) => {
                ctx.config.client_record_timestamp_ms = timestamp;
                ctx.config.set_last_sync(CLIENTS_COLLECTION, timestamp);
                self.upload_attempts.store(0, Ordering::SeqCst);
                self.commands_processed_should_upload = false;
                Ok(())
            }
            Err(StorageError::Collision) => Err(EngineError::UploadCollision {
                collection: CLIENTS_COLLECTION.into(),
            }),
            Err(error) => {
                let attempts = self.upload_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(attempts, %error, "client record upload failed");
                Err(EngineError::Storage(error))
            }
        }
    }
}

impl<C: HttpClient> SyncStage<C> for ClientsEngineStage {
    fn execute(&mut self, ctx: &mut SessionContext<C>) -> EngineResult<StageFlow> {
        let bundle = ctx.key_for_collection(CLIENTS_COLLECTION)?.clone();
        self.download_client_records(ctx, &bundle)?;
        self.check_and_upload(ctx, &bundle)?;
        Ok(StageFlow::Continue)
    }
}

impl std::fmt::Debug for ClientsEngineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientsEngineStage")
            .field(
                "commands_processed_should_upload",
                &self.commands_processed_should_upload,
            )
            .field("upload_attempts", &self.upload_attempts.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfiguration;
    use driftsync_client::{HttpResponse, MockHttpClient};
    use driftsync_crypto::CollectionKeys;
    use driftsync_store::MemoryRepository;
    use serde_json::json;

    fn config() -> SyncConfiguration {
        let mut config = SyncConfiguration::new("john", KeyBundle::generate())
            .with_cluster_url("https://node.example.com")
            .with_device_name("test device");
        config.collection_keys = Some(CollectionKeys::generate());
        config
    }

    fn context(
        config: SyncConfiguration,
        mock: MockHttpClient,
    ) -> SessionContext<MockHttpClient> {
        SessionContext::new(config, Arc::new(mock))
    }

    fn stage() -> (ClientsEngineStage, MemoryRepository) {
        let repo = MemoryRepository::new();
        (ClientsEngineStage::new(Box::new(repo.clone())), repo)
    }

    fn client_envelope(config: &SyncConfiguration, id: &str, commands: Vec<Value>) -> RecordEnvelope {
        let mut payload = ClientPayload::new("peer device", "desktop");
        payload.commands = commands;
        let record = payload
            .into_record(id)
            .unwrap()
            .with_last_modified(2_000);
        let bundle = config.key_for_collection(CLIENTS_COLLECTION).unwrap();
        RecordEnvelope::seal(&record, bundle).unwrap()
    }

    fn newline_body(envelopes: &[RecordEnvelope]) -> Vec<u8> {
        envelopes
            .iter()
            .map(|envelope| envelope.to_json_line().unwrap())
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes()
    }

    #[test]
    fn should_upload_when_never_uploaded() {
        let (stage, _) = stage();
        assert!(stage.should_upload(now_millis(), 0));
    }

    #[test]
    fn should_not_upload_fresh_record_without_commands() {
        let (stage, _) = stage();
        let recent = now_millis() - (CLIENTS_TTL_REFRESH_MS - 1_000);
        assert!(!stage.should_upload(now_millis(), recent));
    }

    #[test]
    fn should_upload_stale_record() {
        let (stage, _) = stage();
        let stale = now_millis() - (CLIENTS_TTL_REFRESH_MS + 1_000);
        assert!(stage.should_upload(now_millis(), stale));
    }

    #[test]
    fn empty_command_batch_does_not_force_upload() {
        let (mut stage, _) = stage();
        stage.process_commands(&[]);
        assert!(!stage.commands_processed_should_upload);
        let recent = now_millis() - 1_000;
        assert!(!stage.should_upload(now_millis(), recent));
    }

    #[test]
    fn any_nonempty_command_batch_forces_upload() {
        let (mut stage, _) = stage();
        // Even a single malformed command forces a re-upload.
        stage.process_commands(&[json!({})]);
        assert!(stage.commands_processed_should_upload);
        let recent = now_millis() - 1_000;
        assert!(stage.should_upload(now_millis(), recent));
    }

    #[test]
    fn wipe_and_store_without_flag() {
        let (mut stage, repo) = stage();
        repo.seed(Record::new("clients", "xxxxxxxxxxxx", json!({"name": "old", "type": "mobile"})));

        let mut session = repo.create_session(0).unwrap();
        let record = Record::new("clients", "yyyyyyyyyyyy", json!({"name": "new", "type": "mobile"}));
        stage.wipe_and_store(session.as_mut(), record).unwrap();

        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn wipe_and_store_with_flag_wipes_once() {
        let (mut stage, repo) = stage();
        repo.seed(Record::new("clients", "xxxxxxxxxxxx", json!({"name": "old", "type": "mobile"})));
        stage.wipe_flag.store(true, Ordering::SeqCst);

        let mut session = repo.create_session(0).unwrap();
        let record = Record::new("clients", "yyyyyyyyyyyy", json!({"name": "new", "type": "mobile"}));
        stage.wipe_and_store(session.as_mut(), record).unwrap();

        assert_eq!(repo.len(), 1);
        assert!(!stage.wipe_flag.load(Ordering::SeqCst));

        // A second store must not wipe again.
        let record = Record::new("clients", "zzzzzzzzzzzz", json!({"name": "z", "type": "mobile"}));
        stage.wipe_and_store(session.as_mut(), record).unwrap();
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn download_stores_peer_records() {
        let config = config();
        let envelopes = vec![
            client_envelope(&config, "peer00000001", vec![]),
            client_envelope(&config, "peer00000002", vec![]),
        ];
        let mock = MockHttpClient::new();
        mock.push_response(HttpResponse {
            status: 200,
            server_timestamp_ms: Some(9_000),
            body: newline_body(&envelopes),
        });

        let (mut stage, repo) = stage();
        let mut ctx = context(config, mock);
        let bundle = ctx.key_for_collection(CLIENTS_COLLECTION).unwrap().clone();

        stage.download_client_records(&mut ctx, &bundle).unwrap();

        assert_eq!(repo.len(), 2);
        assert_eq!(ctx.config.last_sync_for(CLIENTS_COLLECTION), 9_000);
        // Our record never came down: timestamp reset forces re-upload.
        assert_eq!(ctx.config.client_record_timestamp_ms, 0);
    }

    #[test]
    fn download_consumes_own_record_and_commands() {
        let mut config = config();
        config.client_record_timestamp_ms = 1_000;
        let own_guid = config.account_guid.clone();
        let command = json!({"command": "displayURI", "args": ["https://example.org", "peer"]});
        let envelopes = vec![client_envelope(&config, &own_guid, vec![command])];

        let mock = MockHttpClient::new();
        mock.push_response(HttpResponse {
            status: 200,
            server_timestamp_ms: Some(9_000),
            body: newline_body(&envelopes),
        });

        let (mut stage, repo) = stage();
        let mut ctx = context(config, mock);
        let bundle = ctx.key_for_collection(CLIENTS_COLLECTION).unwrap().clone();

        stage.download_client_records(&mut ctx, &bundle).unwrap();

        // Own record is not stored locally, but its commands were seen.
        assert_eq!(repo.len(), 0);
        assert!(stage.commands_processed_should_upload);
        // Timestamp updated from the downloaded record, not reset.
        assert_eq!(ctx.config.client_record_timestamp_ms, 2_000);
    }

    #[test]
    fn upload_success_persists_timestamps_and_resets_counter() {
        let config = config();
        let mock = MockHttpClient::new();
        mock.push_status(200, 42_000);

        let (mut stage, _) = stage();
        stage.upload_attempts.store(MAX_UPLOAD_FAILURE_COUNT, Ordering::SeqCst);
        let mut ctx = context(config, mock);
        let bundle = ctx.key_for_collection(CLIENTS_COLLECTION).unwrap().clone();

        stage.check_and_upload(&mut ctx, &bundle).unwrap();

        assert_eq!(ctx.config.client_record_timestamp_ms, 42_000);
        assert_eq!(ctx.config.last_sync_for(CLIENTS_COLLECTION), 42_000);
        assert_eq!(stage.upload_attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn upload_412_never_touches_the_counter() {
        for preset in [0, MAX_UPLOAD_FAILURE_COUNT] {
            let config = config();
            let mock = MockHttpClient::new();
            mock.push_status(412, 42_000);

            let (mut stage, _) = stage();
            stage.upload_attempts.store(preset, Ordering::SeqCst);
            let mut ctx = context(config, mock);
            let bundle = ctx.key_for_collection(CLIENTS_COLLECTION).unwrap().clone();

            let result = stage.check_and_upload(&mut ctx, &bundle);
            assert!(matches!(result, Err(EngineError::UploadCollision { .. })));
            assert_eq!(stage.upload_attempts.load(Ordering::SeqCst), preset);
        }
    }

    #[test]
    fn upload_failure_increments_by_exactly_one() {
        let config = config();
        let mock = MockHttpClient::new();
        mock.push_status(400, 42_000);

        let (mut stage, _) = stage();
        let mut ctx = context(config, mock);
        let bundle = ctx.key_for_collection(CLIENTS_COLLECTION).unwrap().clone();

        let result = stage.check_and_upload(&mut ctx, &bundle);
        assert!(matches!(result, Err(EngineError::Storage(_))));
        assert_eq!(stage.upload_attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn upload_failure_counter_is_not_clamped_at_max() {
        let config = config();
        let mock = MockHttpClient::new();
        mock.push_status(500, 42_000);

        let (mut stage, _) = stage();
        stage.upload_attempts.store(MAX_UPLOAD_FAILURE_COUNT, Ordering::SeqCst);
        let mut ctx = context(config, mock);
        let bundle = ctx.key_for_collection(CLIENTS_COLLECTION).unwrap().clone();

        assert!(stage.check_and_upload(&mut ctx, &bundle).is_err());
        assert_eq!(
            stage.upload_attempts.load(Ordering::SeqCst),
            MAX_UPLOAD_FAILURE_COUNT + 1
        );
    }

    #[test]
    fn skip_upload_when_record_is_fresh() {
        let mut config = config();
        config.client_record_timestamp_ms = now_millis() - 1_000;
        // No mock response queued: an upload attempt would error.
        let mock = MockHttpClient::new();

        let (mut stage, _) = stage();
        let mut ctx = context(config, mock);
        let bundle = ctx.key_for_collection(CLIENTS_COLLECTION).unwrap().clone();

        stage.check_and_upload(&mut ctx, &bundle).unwrap();
        assert_eq!(stage.upload_attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn upload_sends_precondition_when_record_known() {
        let mut config = config();
        config.client_record_timestamp_ms = now_millis() - (CLIENTS_TTL_REFRESH_MS + 1);
        let mock = MockHttpClient::new();
        mock.push_status(200, 50_000);

        let (mut stage, _) = stage();
        let mut ctx = context(config, mock);
        let bundle = ctx.key_for_collection(CLIENTS_COLLECTION).unwrap().clone();
        stage.check_and_upload(&mut ctx, &bundle).unwrap();

        let requests = ctx.http().requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].if_unmodified_since.is_some());
    }
}
