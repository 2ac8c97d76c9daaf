//! The versioned-collection storage client.

use crate::error::{StorageError, StorageResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use driftsync_protocol::{
    timestamp::millis_to_decimal_seconds, BatchResults, InfoCollections, MetaGlobal,
    RecordEnvelope,
};
use std::sync::Arc;
use tracing::debug;

/// Result of a bulk collection fetch.
#[derive(Debug, Clone)]
pub struct FetchedCollection {
    /// Envelopes in server order.
    pub envelopes: Vec<RecordEnvelope>,
    /// Server timestamp of the response; the caller's next high-water mark
    /// once local commits are done.
    pub server_timestamp_ms: i64,
}

/// Client for one user's storage node.
///
/// Cheap to construct; holds only the cluster coordinates and a shared
/// transport.
#[derive(Debug, Clone)]
pub struct StorageClient<C> {
    http: Arc<C>,
    cluster_url: String,
    api_version: String,
    username: String,
}

impl<C: HttpClient> StorageClient<C> {
    /// Creates a client for `username`'s node at `cluster_url`.
    pub fn new(
        http: Arc<C>,
        cluster_url: impl Into<String>,
        api_version: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let mut cluster_url = cluster_url.into();
        while cluster_url.ends_with('/') {
            cluster_url.pop();
        }
        Self {
            http,
            cluster_url,
            api_version: api_version.into(),
            username: username.into(),
        }
    }

    fn storage_url(&self) -> String {
        format!(
            "{}/{}/{}/storage",
            self.cluster_url, self.api_version, self.username
        )
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.storage_url(), collection)
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.storage_url(), collection, id)
    }

    fn info_collections_url(&self) -> String {
        format!(
            "{}/{}/{}/info/collections",
            self.cluster_url, self.api_version, self.username
        )
    }

    fn run(&self, request: HttpRequest) -> StorageResult<HttpResponse> {
        debug!(method = ?request.method, url = %request.url, "storage request");
        self.http
            .execute(request)
            .map_err(StorageError::transport_retryable)
    }

    fn expect_success(response: HttpResponse) -> StorageResult<HttpResponse> {
        match response.status {
            status if (200..300).contains(&status) => Ok(response),
            412 => Err(StorageError::Collision),
            404 => Err(StorageError::NotFound),
            status => Err(StorageError::HttpStatus(status)),
        }
    }

    fn timestamp(response: &HttpResponse) -> StorageResult<i64> {
        response
            .server_timestamp_ms
            .ok_or(StorageError::MissingTimestamp)
    }

    /// Fetches a collection as newline-delimited envelopes.
    ///
    /// `newer_than_ms` limits the fetch to records modified strictly after
    /// the given time; `full` requests whole envelopes rather than bare ids.
    pub fn get_collection(
        &self,
        collection: &str,
        newer_than_ms: Option<i64>,
        full: bool,
    ) -> StorageResult<FetchedCollection> {
        let mut url = format!("{}?", self.collection_url(collection));
        if full {
            url.push_str("full=1");
        }
        if let Some(newer) = newer_than_ms {
            if full {
                url.push('&');
            }
            url.push_str(&format!("newer={}", millis_to_decimal_seconds(newer)));
        }

        let response = Self::expect_success(self.run(HttpRequest::get(url))?)?;
        let server_timestamp_ms = Self::timestamp(&response)?;

        let body = std::str::from_utf8(&response.body)
            .map_err(|_| StorageError::malformed("collection body is not UTF-8"))?;
        let envelopes = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(RecordEnvelope::from_json_line)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FetchedCollection {
            envelopes,
            server_timestamp_ms,
        })
    }

    /// Fetches a single record.
    pub fn get_record(&self, collection: &str, id: &str) -> StorageResult<(RecordEnvelope, i64)> {
        let response =
            Self::expect_success(self.run(HttpRequest::get(self.record_url(collection, id)))?)?;
        let timestamp = Self::timestamp(&response)?;
        let envelope = RecordEnvelope::from_json_line(
            std::str::from_utf8(&response.body)
                .map_err(|_| StorageError::malformed("record body is not UTF-8"))?,
        )?;
        Ok((envelope, timestamp))
    }

    /// Uploads a single record, optionally guarded by
    /// `X-If-Unmodified-Since`. Returns the server timestamp.
    pub fn put_record(
        &self,
        collection: &str,
        envelope: &RecordEnvelope,
        if_unmodified_since_ms: Option<i64>,
    ) -> StorageResult<i64> {
        let body = envelope.to_json_line()?.into_bytes();
        let mut request = HttpRequest::put(self.record_url(collection, &envelope.id), body);
        if let Some(since) = if_unmodified_since_ms {
            request = request
                .with_if_unmodified_since(millis_to_decimal_seconds(since).to_string());
        }
        let response = Self::expect_success(self.run(request)?)?;
        Self::timestamp(&response)
    }

    /// Uploads a batch of records via POST. Returns the per-record results
    /// and the server timestamp.
    pub fn post_records(
        &self,
        collection: &str,
        envelopes: &[RecordEnvelope],
    ) -> StorageResult<(BatchResults, i64)> {
        let body = serde_json::to_vec(envelopes)
            .map_err(|e| StorageError::malformed(format!("batch body: {e}")))?;
        let response =
            Self::expect_success(self.run(HttpRequest::post(self.collection_url(collection), body))?)?;
        let timestamp = Self::timestamp(&response)?;
        let results = BatchResults::from_slice(&response.body)?;
        Ok((results, timestamp))
    }

    /// Deletes a single record, leaving a tombstone server-side.
    pub fn delete_record(&self, collection: &str, id: &str) -> StorageResult<i64> {
        let response =
            Self::expect_success(self.run(HttpRequest::delete(self.record_url(collection, id)))?)?;
        Self::timestamp(&response)
    }

    /// Wipes one collection.
    pub fn delete_collection(&self, collection: &str) -> StorageResult<i64> {
        let response =
            Self::expect_success(self.run(HttpRequest::delete(self.collection_url(collection)))?)?;
        Self::timestamp(&response)
    }

    /// Wipes all of the user's storage. Used by fresh-start.
    pub fn delete_all_collections(&self) -> StorageResult<i64> {
        let response = Self::expect_success(self.run(HttpRequest::delete(self.storage_url()))?)?;
        Self::timestamp(&response)
    }

    /// Fetches `info/collections`.
    pub fn get_info_collections(&self) -> StorageResult<(InfoCollections, i64)> {
        let response =
            Self::expect_success(self.run(HttpRequest::get(self.info_collections_url()))?)?;
        let timestamp = Self::timestamp(&response)?;
        let body: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| StorageError::malformed(format!("info/collections: {e}")))?;
        Ok((InfoCollections::from_json(&body)?, timestamp))
    }

    /// Fetches `meta/global`. Returns `None` when the server has no meta
    /// record yet (a fresh or wiped node).
    pub fn get_meta_global(&self) -> StorageResult<Option<(MetaGlobal, i64)>> {
        let response = self.run(HttpRequest::get(self.record_url("meta", "global")))?;
        if response.status == 404 {
            return Ok(None);
        }
        let response = Self::expect_success(response)?;
        let timestamp = Self::timestamp(&response)?;
        let envelope = RecordEnvelope::from_json_line(
            std::str::from_utf8(&response.body)
                .map_err(|_| StorageError::malformed("meta/global body is not UTF-8"))?,
        )?;
        Ok(Some((MetaGlobal::from_envelope(&envelope)?, timestamp)))
    }

    /// Uploads a new `meta/global`.
    pub fn put_meta_global(&self, meta: &MetaGlobal) -> StorageResult<i64> {
        self.put_record("meta", &meta.to_envelope()?, None)
    }

    /// Fetches the encrypted `crypto/keys` envelope. Returns `None` when
    /// the server has no keys record.
    pub fn get_keys(&self) -> StorageResult<Option<(RecordEnvelope, i64)>> {
        let response = self.run(HttpRequest::get(self.record_url("crypto", "keys")))?;
        if response.status == 404 {
            return Ok(None);
        }
        let response = Self::expect_success(response)?;
        let timestamp = Self::timestamp(&response)?;
        let envelope = RecordEnvelope::from_json_line(
            std::str::from_utf8(&response.body)
                .map_err(|_| StorageError::malformed("crypto/keys body is not UTF-8"))?,
        )?;
        Ok(Some((envelope, timestamp)))
    }

    /// Uploads a sealed `crypto/keys` envelope.
    pub fn put_keys(&self, envelope: &RecordEnvelope) -> StorageResult<i64> {
        self.put_record("crypto", envelope, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, MockHttpClient};
    use driftsync_crypto::KeyBundle;
    use driftsync_records::Record;
    use serde_json::json;

    fn client(mock: MockHttpClient) -> StorageClient<MockHttpClient> {
        StorageClient::new(Arc::new(mock), "https://node.example.com/", "1.1", "john")
    }

    fn body_response(status: u16, timestamp_ms: i64, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            server_timestamp_ms: Some(timestamp_ms),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn urls_follow_the_wire_scheme() {
        let storage = client(MockHttpClient::new());
        assert_eq!(
            storage.collection_url("bookmarks"),
            "https://node.example.com/1.1/john/storage/bookmarks"
        );
        assert_eq!(
            storage.record_url("meta", "global"),
            "https://node.example.com/1.1/john/storage/meta/global"
        );
        assert_eq!(
            storage.info_collections_url(),
            "https://node.example.com/1.1/john/info/collections"
        );
    }

    #[test]
    fn get_collection_parses_newlines() {
        let bundle = KeyBundle::generate();
        let a = RecordEnvelope::seal(
            &Record::new("bookmarks", "aaaaaaaaaaaa", json!({"title": "a"})),
            &bundle,
        )
        .unwrap();
        let b = RecordEnvelope::seal(
            &Record::new("bookmarks", "bbbbbbbbbbbb", json!({"title": "b"})),
            &bundle,
        )
        .unwrap();
        let body = format!(
            "{}\n{}\n",
            a.to_json_line().unwrap(),
            b.to_json_line().unwrap()
        );

        let mock = MockHttpClient::new();
        mock.push_response(body_response(200, 5_000, &body));
        let storage = client(mock);

        let fetched = storage
            .get_collection("bookmarks", Some(1_500), true)
            .unwrap();
        assert_eq!(fetched.envelopes.len(), 2);
        assert_eq!(fetched.server_timestamp_ms, 5_000);

        let request = &storage.http.requests()[0];
        assert!(request.url.ends_with("/storage/bookmarks?full=1&newer=1.5"));
    }

    #[test]
    fn put_record_collision_maps_to_error() {
        let mock = MockHttpClient::new();
        mock.push_status(412, 9_000);
        let storage = client(mock);

        let bundle = KeyBundle::generate();
        let envelope = RecordEnvelope::seal(
            &Record::new("clients", "cccccccccccc", json!({"name": "n", "type": "mobile"})),
            &bundle,
        )
        .unwrap();

        let result = storage.put_record("clients", &envelope, Some(8_000));
        assert!(matches!(result, Err(StorageError::Collision)));

        let request = &storage.http.requests()[0];
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.if_unmodified_since.as_deref(), Some("8"));
    }

    #[test]
    fn post_records_parses_batch_results() {
        let mock = MockHttpClient::new();
        mock.push_response(body_response(
            200,
            7_000,
            r#"{"modified": 7.0, "success": ["aaaaaaaaaaaa"], "failed": {}}"#,
        ));
        let storage = client(mock);

        let bundle = KeyBundle::generate();
        let envelope = RecordEnvelope::seal(
            &Record::new("bookmarks", "aaaaaaaaaaaa", json!({"title": "a"})),
            &bundle,
        )
        .unwrap();

        let (results, timestamp) = storage.post_records("bookmarks", &[envelope]).unwrap();
        assert!(results.all_succeeded());
        assert_eq!(timestamp, 7_000);

        // Body is a JSON array of envelopes.
        let request = &storage.http.requests()[0];
        let body: serde_json::Value =
            serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert!(body.is_array());
    }

    #[test]
    fn missing_meta_global_is_none() {
        let mock = MockHttpClient::new();
        mock.push_status(404, 1_000);
        let storage = client(mock);
        assert!(storage.get_meta_global().unwrap().is_none());
    }

    #[test]
    fn meta_global_roundtrip_through_wire() {
        let meta = MetaGlobal::new("ssssssssssss", 5);
        let body = meta.to_envelope().unwrap().to_json_line().unwrap();

        let mock = MockHttpClient::new();
        mock.push_response(body_response(200, 2_000, &body));
        let storage = client(mock);

        let (fetched, timestamp) = storage.get_meta_global().unwrap().unwrap();
        assert_eq!(fetched, meta);
        assert_eq!(timestamp, 2_000);
    }

    #[test]
    fn transport_error_is_retryable() {
        let mock = MockHttpClient::new();
        mock.push_transport_error("connection refused");
        let storage = client(mock);
        let err = storage.get_info_collections().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn delete_record_hits_record_url() {
        let mock = MockHttpClient::new();
        mock.push_status(200, 4_000);
        let storage = client(mock);
        assert_eq!(storage.delete_record("bookmarks", "aaaaaaaaaaaa").unwrap(), 4_000);
        let request = &storage.http.requests()[0];
        assert_eq!(request.method, Method::Delete);
        assert!(request.url.ends_with("/storage/bookmarks/aaaaaaaaaaaa"));
    }

    #[test]
    fn wipe_everything_hits_storage_root() {
        let mock = MockHttpClient::new();
        mock.push_status(200, 3_000);
        let storage = client(mock);
        assert_eq!(storage.delete_all_collections().unwrap(), 3_000);
        let request = &storage.http.requests()[0];
        assert_eq!(request.method, Method::Delete);
        assert!(request.url.ends_with("/1.1/john/storage"));
    }
}
