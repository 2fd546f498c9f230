//! Change events received from a realtime feed.
//!
//! The feed delivers `{action, record}` objects. They are validated into a
//! [`ChangeEvent`] before they are allowed near a collection, so a malformed
//! event becomes an error the caller can log and skip.

use crate::{error::Result, Error, Record, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Kind of change reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }

    /// Parse a wire action name.
    pub fn parse(action: &str) -> Result<Self> {
        match action {
            "create" => Ok(ChangeAction::Create),
            "update" => Ok(ChangeAction::Update),
            "delete" => Ok(ChangeAction::Delete),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event exactly as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChangeEvent {
    pub action: String,
    #[serde(default)]
    pub record: Value,
}

/// A validated change to a remote collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Created(Record),
    Updated(Record),
    /// Deletes only need the identifier.
    Deleted { id: RecordId },
}

impl ChangeEvent {
    /// Create a deletion event.
    pub fn deleted(id: impl Into<RecordId>) -> Self {
        ChangeEvent::Deleted { id: id.into() }
    }

    /// Get the action of this event.
    pub fn action(&self) -> ChangeAction {
        match self {
            ChangeEvent::Created(_) => ChangeAction::Create,
            ChangeEvent::Updated(_) => ChangeAction::Update,
            ChangeEvent::Deleted { .. } => ChangeAction::Delete,
        }
    }

    /// Get the record ID this event targets.
    pub fn record_id(&self) -> &str {
        match self {
            ChangeEvent::Created(record) | ChangeEvent::Updated(record) => &record.id,
            ChangeEvent::Deleted { id } => id,
        }
    }

    /// Get the full record, if the event carries one.
    pub fn record(&self) -> Option<&Record> {
        match self {
            ChangeEvent::Created(record) | ChangeEvent::Updated(record) => Some(record),
            ChangeEvent::Deleted { .. } => None,
        }
    }

    /// Validate a wire event.
    pub fn from_raw(raw: RawChangeEvent) -> Result<Self> {
        let action = ChangeAction::parse(&raw.action)?;
        match action {
            ChangeAction::Create => Ok(ChangeEvent::Created(Record::from_value(raw.record)?)),
            ChangeAction::Update => Ok(ChangeEvent::Updated(Record::from_value(raw.record)?)),
            ChangeAction::Delete => {
                let id = raw
                    .record
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .ok_or(Error::MissingRecordId)?;
                Ok(ChangeEvent::deleted(id))
            }
        }
    }

    /// Parse and validate a JSON-encoded wire event.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawChangeEvent =
            serde_json::from_str(text).map_err(|e| Error::InvalidEvent(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Wire representation of this event.
    pub fn to_raw(&self) -> RawChangeEvent {
        let record = match self {
            ChangeEvent::Created(record) | ChangeEvent::Updated(record) => record.to_value(),
            ChangeEvent::Deleted { id } => json!({ "id": id }),
        };
        RawChangeEvent {
            action: self.action().as_str().to_string(),
            record,
        }
    }
}

impl TryFrom<RawChangeEvent> for ChangeEvent {
    type Error = Error;

    fn try_from(raw: RawChangeEvent) -> Result<Self> {
        ChangeEvent::from_raw(raw)
    }
}
