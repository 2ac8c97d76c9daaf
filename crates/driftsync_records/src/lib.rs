//! # driftsync records
//!
//! The record model shared by every driftsync layer:
//! - [`Record`]: the generic record envelope (identity, payload, timestamp,
//!   tombstone flag, local row handle)
//! - [`ClientPayload`] / [`BookmarkPayload`]: typed payloads for the two
//!   built-in collections

mod error;
mod payload;
mod record;

pub use error::{RecordsError, RecordsResult};
pub use payload::{BookmarkPayload, ClientPayload};
pub use record::Record;
