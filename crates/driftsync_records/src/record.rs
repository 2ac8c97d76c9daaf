//! The generic record envelope.

use serde_json::Value;

/// A synchronized record.
///
/// Identity is `(collection, id)`. Records are immutable once persisted
/// except through an explicit store or delete; `last_modified` is
/// monotonically non-decreasing across stores by any one party and is the
/// sole tie-breaker for conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Globally-unique short identifier (GUID).
    pub id: String,
    /// Name of the collection this record belongs to.
    pub collection: String,
    /// Collection-specific payload.
    pub payload: Value,
    /// Last modification time in milliseconds since the epoch.
    pub last_modified: i64,
    /// Server-assigned sort hint.
    pub sortindex: i64,
    /// Whether this record is a deletion marker.
    pub deleted: bool,
    /// Purely-local row handle the remote side cannot know. Preserved by
    /// the reconciler across replacements.
    pub local_id: Option<u64>,
}

impl Record {
    /// Creates a live record with an empty timestamp.
    pub fn new(collection: impl Into<String>, id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            payload,
            last_modified: 0,
            sortindex: 0,
            deleted: false,
            local_id: None,
        }
    }

    /// Creates a tombstone marking the record as deleted.
    pub fn tombstone(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            payload: Value::Object(serde_json::Map::new()),
            last_modified: 0,
            sortindex: 0,
            deleted: true,
            local_id: None,
        }
    }

    /// Sets the last-modified timestamp.
    #[must_use]
    pub fn with_last_modified(mut self, millis: i64) -> Self {
        self.last_modified = millis;
        self
    }

    /// Sets the sort index.
    #[must_use]
    pub fn with_sortindex(mut self, sortindex: i64) -> Self {
        self.sortindex = sortindex;
        self
    }

    /// Returns true if this record is a deletion marker.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.deleted
    }

    /// Returns true if `other` names the same record.
    #[must_use]
    pub fn same_identity(&self, other: &Record) -> bool {
        self.collection == other.collection && self.id == other.id
    }

    /// Compares the synchronized content of two records, ignoring local
    /// bookkeeping (`local_id`) and timestamps.
    #[must_use]
    pub fn equal_payloads(&self, other: &Record) -> bool {
        self.same_identity(other) && self.deleted == other.deleted && self.payload == other.payload
    }
}
