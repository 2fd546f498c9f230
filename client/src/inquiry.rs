//! Typed view of inquiry records.
//!
//! Inquiries live in the `messages` collection. A thread starts with a
//! `parent` inquiry about a property; replies point at it through `parent`.

use chrono::{DateTime, NaiveDateTime, Utc};
use roost_engine::{LiveCollection, Record};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Collection holding inquiries.
pub const INQUIRY_COLLECTION: &str = "messages";

/// Timestamp layout used by the BaaS.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.fZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InquiryKind {
    /// Root of a thread
    Parent,
    Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InquiryStatus {
    Unread,
    Read,
    Archived,
}

/// A message between a prospective buyer and an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Inquiry {
    pub id: String,
    pub body: String,
    /// User id of the author
    pub sender: String,
    /// Property the thread is about
    pub property: String,
    /// Thread root, for replies
    pub parent: Option<String>,
    pub kind: InquiryKind,
    pub status: InquiryStatus,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// Display name from the expanded `sender` relation
    pub sender_name: Option<String>,
    /// Title from the expanded `property` relation
    pub property_title: Option<String>,
}

impl Inquiry {
    /// Build the typed view of a `messages` record.
    pub fn from_record(record: &Record) -> Result<Self> {
        let text = |name: &str| record.str_field(name).unwrap_or_default().to_string();

        Ok(Self {
            id: record.id.clone(),
            body: text("body"),
            sender: text("sender"),
            property: text("property"),
            parent: record
                .str_field("parent")
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            kind: enum_field(record, "type", "type must be parent or reply")?,
            status: enum_field(record, "status", "status must be unread, read or archived")?,
            created: parse_timestamp(&record.created),
            updated: parse_timestamp(&record.updated),
            sender_name: expanded_str(record, "sender", "name"),
            property_title: expanded_str(record, "property", "title"),
        })
    }

    /// Typed view of every valid inquiry in `collection`, oldest first.
    ///
    /// Records that are not valid inquiries are skipped.
    pub fn all(collection: &LiveCollection) -> Vec<Self> {
        let mut inquiries: Vec<Self> = collection.read(|state| {
            state
                .iter()
                .filter_map(|record| match Self::from_record(record) {
                    Ok(inquiry) => Some(inquiry),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping record that is not an inquiry");
                        None
                    }
                })
                .collect()
        });
        // Stable sort keeps fetch order for equal or missing timestamps.
        inquiries.sort_by_key(|inquiry| inquiry.created);
        inquiries
    }

    pub fn is_thread_root(&self) -> bool {
        self.kind == InquiryKind::Parent
    }

    pub fn is_unread(&self) -> bool {
        self.status == InquiryStatus::Unread
    }
}

fn enum_field<T: DeserializeOwned>(record: &Record, name: &str, reason: &str) -> Result<T> {
    record
        .field(name)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .ok_or_else(|| ClientError::InvalidRecord {
            id: record.id.clone(),
            reason: reason.to_string(),
        })
}

fn expanded_str(record: &Record, relation: &str, field: &str) -> Option<String> {
    record
        .expanded(relation)
        .and_then(|related| related.get(field))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

/// Parse a BaaS timestamp (`2024-05-01 10:00:00.123Z`), falling back to RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }

    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}
