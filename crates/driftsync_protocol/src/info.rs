//! The `info/collections` timestamp map.

use crate::error::{ProtocolError, ProtocolResult};
use crate::timestamp::decimal_seconds_to_millis;
use serde_json::Value;
use std::collections::BTreeMap;

/// Last-modified timestamps per collection, as reported by
/// `info/collections`. Used to decide which per-collection stages have
/// work before fetching anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoCollections {
    collections: BTreeMap<String, i64>,
}

impl InfoCollections {
    /// Creates an empty map (a brand-new account).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON body returned by the `info/collections` endpoint.
    pub fn from_json(body: &Value) -> ProtocolResult<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| ProtocolError::malformed("info/collections is not an object"))?;

        let mut collections = BTreeMap::new();
        for (name, value) in object {
            let seconds = value.as_f64().ok_or_else(|| {
                ProtocolError::malformed(format!("non-numeric timestamp for {name:?}"))
            })?;
            collections.insert(name.clone(), decimal_seconds_to_millis(seconds));
        }
        Ok(Self { collections })
    }

    /// Last-modified time of a collection in milliseconds, if the server
    /// has the collection at all.
    #[must_use]
    pub fn modified_for(&self, collection: &str) -> Option<i64> {
        self.collections.get(collection).copied()
    }

    /// Returns true if the collection has changed past `millis`.
    #[must_use]
    pub fn changed_since(&self, collection: &str, millis: i64) -> bool {
        self.modified_for(collection)
            .is_some_and(|modified| modified > millis)
    }

    /// Iterates over `(collection, modified-millis)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.collections.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
