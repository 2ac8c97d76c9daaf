//! HTTP transport abstraction.
//!
//! The actual HTTP stack is abstracted via a trait to allow different
//! implementations (reqwest, ureq, platform stacks) or a loopback double
//! for tests. Implementations are responsible for extracting the server
//! timestamp header (`X-Weave-Timestamp`, decimal seconds) into
//! [`HttpResponse::server_timestamp_ms`].

use std::collections::VecDeque;
use std::sync::Mutex;

/// HTTP method of a storage request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// PUT.
    Put,
    /// POST.
    Post,
    /// DELETE.
    Delete,
}

/// A request to the storage service.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// `X-If-Unmodified-Since` precondition, decimal seconds, if any.
    pub if_unmodified_since: Option<String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a bodyless GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            if_unmodified_since: None,
            body: None,
        }
    }

    /// Creates a PUT request with a body.
    pub fn put(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            if_unmodified_since: None,
            body: Some(body),
        }
    }

    /// Creates a POST request with a body.
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            if_unmodified_since: None,
            body: Some(body),
        }
    }

    /// Creates a DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            url: url.into(),
            if_unmodified_since: None,
            body: None,
        }
    }

    /// Attaches an `X-If-Unmodified-Since` precondition.
    #[must_use]
    pub fn with_if_unmodified_since(mut self, decimal_seconds: String) -> Self {
        self.if_unmodified_since = Some(decimal_seconds);
        self
    }
}

/// A response from the storage service.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Server timestamp in milliseconds, from the timestamp header.
    pub server_timestamp_ms: Option<i64>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for any 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations must apply a bounded request timeout; exceeding it is
/// reported as a transport error (the `Err` string), which callers treat
/// as retryable.
pub trait HttpClient: Send + Sync {
    /// Executes a request, returning the response or a transport-level
    /// error message.
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// A mock client replaying canned responses, recording every request.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates an empty mock client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response to be returned by the next unanswered request.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queues a transport error.
    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Err(message.into()));
    }

    /// Queues a bodyless status response carrying a server timestamp.
    pub fn push_status(&self, status: u16, server_timestamp_ms: i64) {
        self.push_response(HttpResponse {
            status,
            server_timestamp_ms: Some(server_timestamp_ms),
            body: Vec::new(),
        });
    }

    /// Returns all requests executed so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpClient for MockHttpClient {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no mock response queued".into()))
    }
}
