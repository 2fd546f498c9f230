//! Record types for remote collection entries.

use crate::{error::Result, CollectionName, Error, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record of a remote collection.
///
/// The system fields the BaaS attaches to every record are typed; everything
/// else (message body, sender, property reference, status, ...) is kept in
/// `fields` and flattened back out on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable unique identifier within the collection
    pub id: RecordId,
    /// Server-side collection identifier
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collection_id: String,
    /// Collection this record belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collection_name: CollectionName,
    /// Creation timestamp as sent by the server
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,
    /// Last update timestamp as sent by the server
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated: String,
    /// Related records inlined by the server, keyed by relation field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<Map<String, Value>>,
    /// Collection-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with no fields.
    pub fn new(id: impl Into<RecordId>, collection_name: impl Into<CollectionName>) -> Self {
        Self {
            id: id.into(),
            collection_id: String::new(),
            collection_name: collection_name.into(),
            created: String::new(),
            updated: String::new(),
            expand: None,
            fields: Map::new(),
        }
    }

    /// Parse a record from its JSON representation.
    ///
    /// Fails with [`Error::MissingRecordId`] when `id` is absent, not a
    /// string, or empty.
    pub fn from_value(value: Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidRecord("record must be an object".into()))?;

        match obj.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {}
            _ => return Err(Error::MissingRecordId),
        }

        serde_json::from_value(value).map_err(|e| Error::InvalidRecord(e.to_string()))
    }

    /// JSON representation of this record.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Builder-style method to set a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder-style method to inline a related record.
    pub fn with_expand(mut self, relation: impl Into<String>, value: impl Into<Value>) -> Self {
        self.expand
            .get_or_insert_with(Map::new)
            .insert(relation.into(), value.into());
        self
    }

    /// Builder-style method to set the timestamps.
    pub fn with_timestamps(mut self, created: impl Into<String>, updated: impl Into<String>) -> Self {
        self.created = created.into();
        self.updated = updated.into();
        self
    }

    /// Get a collection-specific field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a field as a string slice.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Get an inlined related record.
    pub fn expanded(&self, relation: &str) -> Option<&Value> {
        self.expand.as_ref().and_then(|e| e.get(relation))
    }
}
