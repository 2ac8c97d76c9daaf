//! # driftsync client
//!
//! The storage client speaking the remote versioned-collection wire
//! protocol against a single cluster URL.
//!
//! This crate provides:
//! - [`HttpClient`]: the transport abstraction (implement with reqwest,
//!   ureq, a platform HTTP stack, or a loopback test double)
//! - [`StorageClient`]: collection/record/meta/keys operations with
//!   precondition support and explicit failure classification
//! - [`MockHttpClient`]: a canned-response client for tests
//!
//! Every response carries the server timestamp; callers persist it as the
//! new high-water mark for a collection only after the corresponding local
//! store has committed the records it represents.

mod error;
mod http;
mod storage;

pub use error::{StorageError, StorageResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, MockHttpClient};
pub use storage::{FetchedCollection, StorageClient};
