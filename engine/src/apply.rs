//! Event-to-collection mapping.
//!
//! Every change event becomes exactly one collection write:
//!
//! | event    | write                     |
//! |----------|---------------------------|
//! | `create` | `write_insert(record)`    |
//! | `update` | `write_update(record)`    |
//! | `delete` | `write_delete(record.id)` |
//!
//! Insert and update share the upsert path: an update for an unknown
//! identifier inserts it, and a delete followed by an update brings the
//! record back (last write wins).

use crate::{
    error::Result, ChangeEvent, LiveCollection, RawChangeEvent, Record, WriteOutcome,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Removed,
    Unchanged,
    Filtered,
    /// The applier was detached; the collection was not touched.
    Detached,
}

impl From<WriteOutcome> for Applied {
    fn from(outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Inserted => Applied::Inserted,
            WriteOutcome::Updated => Applied::Updated,
            WriteOutcome::Removed => Applied::Removed,
            WriteOutcome::Unchanged => Applied::Unchanged,
            WriteOutcome::Filtered => Applied::Filtered,
        }
    }
}

impl Applied {
    /// Check if the collection changed.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Applied::Inserted | Applied::Updated | Applied::Removed)
    }
}

/// Applies change events to a [`LiveCollection`] until detached.
///
/// Clones share the attachment flag, so detaching any clone stops them all.
#[derive(Debug, Clone)]
pub struct EventApplier {
    collection: Arc<LiveCollection>,
    attached: Arc<AtomicBool>,
}

impl EventApplier {
    /// Create an applier writing into `collection`.
    pub fn new(collection: Arc<LiveCollection>) -> Self {
        Self {
            collection,
            attached: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The collection this applier writes into.
    pub fn collection(&self) -> &Arc<LiveCollection> {
        &self.collection
    }

    /// Apply one event.
    pub fn apply(&self, event: ChangeEvent) -> Applied {
        if !self.is_attached() {
            return Applied::Detached;
        }

        let outcome = match event {
            ChangeEvent::Created(record) => self.collection.write_insert(record),
            ChangeEvent::Updated(record) => self.collection.write_update(record),
            ChangeEvent::Deleted { id } => self.collection.write_delete(&id),
        };
        outcome.into()
    }

    /// Validate and apply a wire event.
    ///
    /// Invalid events are returned as errors and leave the collection alone.
    pub fn apply_raw(&self, raw: RawChangeEvent) -> Result<Applied> {
        let event = ChangeEvent::from_raw(raw)?;
        Ok(self.apply(event))
    }

    /// Parse, validate, and apply a JSON-encoded wire event.
    pub fn apply_json(&self, text: &str) -> Result<Applied> {
        let event = ChangeEvent::from_json(text)?;
        Ok(self.apply(event))
    }

    /// Apply events in order, returning each outcome.
    pub fn apply_all(&self, events: impl IntoIterator<Item = ChangeEvent>) -> Vec<Applied> {
        events.into_iter().map(|event| self.apply(event)).collect()
    }

    /// Replace the collection contents with a fresh fetch.
    ///
    /// Returns the number of records kept, or `None` if detached.
    pub fn reset(&self, records: impl IntoIterator<Item = Record>) -> Option<usize> {
        if !self.is_attached() {
            return None;
        }
        Some(self.collection.reset(records))
    }

    /// Stop applying events. Idempotent.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}
