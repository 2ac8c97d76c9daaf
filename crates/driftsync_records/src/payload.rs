//! Typed payloads for the built-in collections.

use crate::error::{RecordsError, RecordsResult};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a record in the `clients` collection: one entry per device,
/// carrying the device's advertised identity and any queued inter-device
/// commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPayload {
    /// Human-readable device name.
    pub name: String,
    /// Device form factor, e.g. `"mobile"` or `"desktop"`.
    #[serde(rename = "type")]
    pub client_type: String,
    /// Commands queued for this device by its peers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Value>,
}

impl ClientPayload {
    /// Creates a payload with no pending commands.
    pub fn new(name: impl Into<String>, client_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_type: client_type.into(),
            commands: Vec::new(),
        }
    }

    /// Wraps the payload into a `clients` record with the given id.
    pub fn into_record(self, id: impl Into<String>) -> RecordsResult<Record> {
        let payload = serde_json::to_value(&self)
            .map_err(|e| RecordsError::malformed(format!("client payload: {e}")))?;
        Ok(Record::new("clients", id, payload))
    }

    /// Reads the payload back out of a `clients` record.
    pub fn from_record(record: &Record) -> RecordsResult<Self> {
        if record.collection != "clients" {
            return Err(RecordsError::WrongCollection {
                got: record.collection.clone(),
                expected: "clients".into(),
            });
        }
        serde_json::from_value(record.payload.clone())
            .map_err(|e| RecordsError::malformed(format!("client payload: {e}")))
    }
}

/// Payload of a record in the `bookmarks` collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BookmarkPayload {
    /// Bookmark title.
    #[serde(default)]
    pub title: String,
    /// Bookmarked URI.
    #[serde(rename = "bmkUri", default)]
    pub bmk_uri: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// User-assigned tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Keyword shortcut.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    /// GUID of the containing folder.
    #[serde(rename = "parentid", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl BookmarkPayload {
    /// Creates a plain bookmark payload.
    pub fn new(title: impl Into<String>, bmk_uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            bmk_uri: bmk_uri.into(),
            ..Self::default()
        }
    }

    /// Wraps the payload into a `bookmarks` record with the given id.
    pub fn into_record(self, id: impl Into<String>) -> RecordsResult<Record> {
        let payload = serde_json::to_value(&self)
            .map_err(|e| RecordsError::malformed(format!("bookmark payload: {e}")))?;
        Ok(Record::new("bookmarks", id, payload))
    }

    /// Reads the payload back out of a `bookmarks` record.
    pub fn from_record(record: &Record) -> RecordsResult<Self> {
        if record.collection != "bookmarks" {
            return Err(RecordsError::WrongCollection {
                got: record.collection.clone(),
                expected: "bookmarks".into(),
            });
        }
        serde_json::from_value(record.payload.clone())
            .map_err(|e| RecordsError::malformed(format!("bookmark payload: {e}")))
    }
}
