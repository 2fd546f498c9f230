//! Local record predicates.
//!
//! A live collection may carry a [`RecordFilter`]. Upserts of records that
//! do not match are dropped, and a present record whose update stops matching
//! is removed, so the local view never holds records outside its query.

use crate::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a single field is compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum FieldMatch {
    Equals(Value),
    NotEquals(Value),
    OneOf(Vec<Value>),
    /// Field exists and is neither null nor an empty string
    Present,
    /// Field is missing, null, or an empty string
    Absent,
}

/// A predicate over one field of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCondition {
    pub field: String,
    #[serde(rename = "match")]
    pub matcher: FieldMatch,
}

impl FieldCondition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            matcher: FieldMatch::Equals(value.into()),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            matcher: FieldMatch::NotEquals(value.into()),
        }
    }

    pub fn one_of<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            field: field.into(),
            matcher: FieldMatch::OneOf(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn present(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            matcher: FieldMatch::Present,
        }
    }

    pub fn absent(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            matcher: FieldMatch::Absent,
        }
    }

    /// Evaluate this condition against a record.
    pub fn matches(&self, record: &Record) -> bool {
        let value = record.field(&self.field);
        match &self.matcher {
            FieldMatch::Equals(expected) => value == Some(expected),
            FieldMatch::NotEquals(expected) => value != Some(expected),
            FieldMatch::OneOf(options) => value.is_some_and(|v| options.contains(v)),
            FieldMatch::Present => !is_blank(value),
            FieldMatch::Absent => is_blank(value),
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Conjunction of field conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    pub conditions: Vec<FieldCondition>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to add a condition.
    pub fn with(mut self, condition: FieldCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Shorthand for `with(FieldCondition::eq(field, value))`.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(FieldCondition::eq(field, value))
    }

    /// Check whether a record satisfies every condition.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inquiry(kind: &str, status: &str) -> Record {
        Record::new("m1", "messages")
            .with_field("type", kind)
            .with_field("status", status)
            .with_field("parent", "")
    }

    #[test]
    fn equality() {
        let record = inquiry("parent", "unread");
        assert!(FieldCondition::eq("type", "parent").matches(&record));
        assert!(!FieldCondition::eq("type", "reply").matches(&record));
        assert!(FieldCondition::ne("status", "archived").matches(&record));
        assert!(!FieldCondition::eq("missing", "x").matches(&record));
    }

    #[test]
    fn one_of() {
        let record = inquiry("parent", "read");
        assert!(FieldCondition::one_of("status", ["unread", "read"]).matches(&record));
        assert!(!FieldCondition::one_of("status", ["archived"]).matches(&record));
        assert!(!FieldCondition::one_of("missing", ["read"]).matches(&record));
    }

    #[test]
    fn presence_treats_empty_string_as_blank() {
        let record = inquiry("parent", "read").with_field("sender", json!(null));
        assert!(FieldCondition::absent("parent").matches(&record));
        assert!(FieldCondition::absent("sender").matches(&record));
        assert!(FieldCondition::absent("missing").matches(&record));
        assert!(FieldCondition::present("status").matches(&record));
        assert!(!FieldCondition::present("parent").matches(&record));
    }

    #[test]
    fn conjunction() {
        let filter = RecordFilter::new()
            .eq("type", "parent")
            .with(FieldCondition::ne("status", "archived"));

        assert!(filter.matches(&inquiry("parent", "unread")));
        assert!(!filter.matches(&inquiry("parent", "archived")));
        assert!(!filter.matches(&inquiry("reply", "unread")));
        assert!(RecordFilter::new().matches(&inquiry("reply", "archived")));
    }

    #[test]
    fn filter_serialization() {
        let filter = RecordFilter::new()
            .eq("type", "parent")
            .with(FieldCondition::present("property"));

        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            json,
            json!({"conditions": [
                {"field": "type", "match": {"op": "equals", "value": "parent"}},
                {"field": "property", "match": {"op": "present"}}
            ]})
        );

        let parsed: RecordFilter = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, filter);
    }
}
