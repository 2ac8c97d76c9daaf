//! # driftsync protocol
//!
//! Wire types for the versioned collection storage API:
//! - [`RecordEnvelope`]: the encrypted record as it travels on the wire
//! - [`MetaGlobal`]: the `meta/global` compatibility record
//! - [`InfoCollections`]: the `info/collections` timestamp map
//! - [`KeysRecord`]: the encrypted `crypto/keys` record
//! - [`BatchResults`]: the bulk-upload response body
//! - [`Command`]: inter-device commands embedded in `clients` records
//!
//! All bodies are JSON; collection fetches stream newline-delimited
//! envelopes (`application/newlines`). Server timestamps are decimal
//! seconds on the wire and milliseconds in memory.

mod batch;
mod command;
mod envelope;
mod error;
mod info;
mod keys;
mod meta;
pub mod timestamp;

pub use batch::BatchResults;
pub use command::Command;
pub use envelope::RecordEnvelope;
pub use error::{ProtocolError, ProtocolResult};
pub use info::InfoCollections;
pub use keys::KeysRecord;
pub use meta::MetaGlobal;
