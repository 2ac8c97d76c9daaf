//! Test support: an in-memory loopback storage server speaking the wire
//! protocol, plus a recording session callback.

use driftsync_client::{HttpClient, HttpRequest, HttpResponse, Method};
use driftsync_engine::{EngineError, SessionCallback, Stage};
use driftsync_protocol::{MetaGlobal, RecordEnvelope};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Records every callback event a session emits.
#[derive(Default)]
pub struct RecordingCallback {
    pub successes: AtomicU32,
    pub errors: AtomicU32,
    pub stages: Mutex<Vec<Stage>>,
    pub last_error: Mutex<Option<String>>,
}

impl SessionCallback for RecordingCallback {
    fn handle_stage_completed(&self, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn handle_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_error(&self, error: &EngineError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        *self.last_error.lock().unwrap() = Some(error.to_string());
    }
}

impl RecordingCallback {
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> u32 {
        self.errors.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ServerState {
    clock_ms: i64,
    collections: BTreeMap<String, BTreeMap<String, RecordEnvelope>>,
    fail_put: Option<(String, u16)>,
}

/// An in-memory storage node: collections of envelopes, a monotonic
/// clock, and optional PUT failure injection.
pub struct LoopbackServer {
    state: Mutex<ServerState>,
}

impl LoopbackServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState {
                clock_ms: 1_000_000,
                ..ServerState::default()
            }),
        }
    }

    /// Seeds an envelope with an explicit modification time.
    pub fn insert_envelope(&self, collection: &str, mut envelope: RecordEnvelope, modified_ms: i64) {
        envelope.modified_ms = modified_ms;
        self.state
            .lock()
            .unwrap()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(envelope.id.clone(), envelope);
    }

    /// Seeds `meta/global`.
    pub fn set_meta(&self, meta: &MetaGlobal) {
        let envelope = meta.to_envelope().unwrap();
        self.insert_envelope("meta", envelope, 1_000);
    }

    /// The current `meta/global`, if any.
    pub fn meta(&self) -> Option<MetaGlobal> {
        let state = self.state.lock().unwrap();
        let envelope = state.collections.get("meta")?.get("global")?;
        MetaGlobal::from_envelope(envelope).ok()
    }

    pub fn has_keys(&self) -> bool {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get("crypto")
            .is_some_and(|records| records.contains_key("keys"))
    }

    pub fn record_count(&self, collection: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn envelope(&self, collection: &str, id: &str) -> Option<RecordEnvelope> {
        let state = self.state.lock().unwrap();
        state.collections.get(collection)?.get(id).cloned()
    }

    /// Makes every PUT to `collection` fail with `status`.
    pub fn set_fail_put(&self, collection: &str, status: u16) {
        self.state.lock().unwrap().fail_put = Some((collection.to_string(), status));
    }

    fn respond(now: i64, status: u16, body: Vec<u8>) -> HttpResponse {
        HttpResponse {
            status,
            server_timestamp_ms: Some(now),
            body,
        }
    }
}

fn route(url: &str) -> Option<(Vec<String>, BTreeMap<String, String>)> {
    let idx = url.find("/1.1/")?;
    let rest = &url[idx + 5..];
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, query),
        None => (rest, ""),
    };
    let segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect();
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    Some((segments, params))
}

impl HttpClient for LoopbackServer {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mut state = self.state.lock().unwrap();
        state.clock_ms += 1_000;
        let now = state.clock_ms;

        let (segments, params) =
            route(&request.url).ok_or_else(|| format!("unroutable URL {}", request.url))?;
        let parts: Vec<&str> = segments.iter().skip(1).map(String::as_str).collect();

        match (request.method, parts.as_slice()) {
            (Method::Get, ["info", "collections"]) => {
                let mut body = serde_json::Map::new();
                for (name, records) in &state.collections {
                    if let Some(max) = records.values().map(|e| e.modified_ms).max() {
                        body.insert(name.clone(), json!(max as f64 / 1000.0));
                    }
                }
                Ok(Self::respond(
                    now,
                    200,
                    serde_json::Value::Object(body).to_string().into_bytes(),
                ))
            }

            (Method::Delete, ["storage"]) => {
                state.collections.clear();
                Ok(Self::respond(now, 200, Vec::new()))
            }

            (Method::Get, ["storage", collection]) => {
                let newer_ms = params
                    .get("newer")
                    .and_then(|value| value.parse::<f64>().ok())
                    .map(|seconds| (seconds * 1000.0).round() as i64);
                let lines = state
                    .collections
                    .get(*collection)
                    .map(|records| {
                        records
                            .values()
                            .filter(|envelope| {
                                newer_ms.map_or(true, |newer| envelope.modified_ms > newer)
                            })
                            .map(|envelope| envelope.to_json_line().unwrap())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Ok(Self::respond(now, 200, lines.join("\n").into_bytes()))
            }

            (Method::Post, ["storage", collection]) => {
                let body = request.body.as_deref().unwrap_or(&[]);
                let envelopes: Vec<RecordEnvelope> =
                    serde_json::from_slice(body).map_err(|e| e.to_string())?;
                let ids: Vec<String> = envelopes.iter().map(|e| e.id.clone()).collect();
                let records = state.collections.entry(collection.to_string()).or_default();
                for mut envelope in envelopes {
                    envelope.modified_ms = now;
                    records.insert(envelope.id.clone(), envelope);
                }
                let body = json!({
                    "modified": now as f64 / 1000.0,
                    "success": ids,
                    "failed": {},
                });
                Ok(Self::respond(now, 200, body.to_string().into_bytes()))
            }

            (Method::Delete, ["storage", collection]) => {
                state.collections.remove(*collection);
                Ok(Self::respond(now, 200, Vec::new()))
            }

            (Method::Get, ["storage", collection, id]) => {
                match state
                    .collections
                    .get(*collection)
                    .and_then(|records| records.get(*id))
                {
                    Some(envelope) => Ok(Self::respond(
                        now,
                        200,
                        envelope.to_json_line().unwrap().into_bytes(),
                    )),
                    None => Ok(Self::respond(now, 404, Vec::new())),
                }
            }

            (Method::Put, ["storage", collection, id]) => {
                if let Some((failing, status)) = &state.fail_put {
                    if failing == collection {
                        return Ok(Self::respond(now, *status, Vec::new()));
                    }
                }

                if let Some(since) = &request.if_unmodified_since {
                    let since_ms = since
                        .parse::<f64>()
                        .map(|seconds| (seconds * 1000.0).round() as i64)
                        .map_err(|e| e.to_string())?;
                    let modified = state
                        .collections
                        .get(*collection)
                        .and_then(|records| records.get(*id))
                        .map(|envelope| envelope.modified_ms);
                    if modified.is_some_and(|modified| modified > since_ms) {
                        return Ok(Self::respond(now, 412, Vec::new()));
                    }
                }

                let body = request.body.as_deref().unwrap_or(&[]);
                let mut envelope: RecordEnvelope = serde_json::from_slice(body)
                    .map_err(|e| format!("bad PUT body: {e}"))?;
                envelope.modified_ms = now;
                state
                    .collections
                    .entry(collection.to_string())
                    .or_default()
                    .insert(envelope.id.clone(), envelope);
                let body = format!("{}", now as f64 / 1000.0);
                Ok(Self::respond(now, 200, body.into_bytes()))
            }

            (Method::Delete, ["storage", collection, id]) => {
                if let Some(records) = state.collections.get_mut(*collection) {
                    records.remove(*id);
                }
                Ok(Self::respond(now, 200, Vec::new()))
            }

            (method, parts) => Err(format!("unhandled route {method:?} {parts:?}")),
        }
    }
}
