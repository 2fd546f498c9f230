//! Collections - the client-side view of a remote collection.
//!
//! [`Collection`] is the plain keyed container. [`LiveCollection`] wraps it
//! for sharing: one writer (the event applier) mutates it while any number
//! of readers take snapshots or listen for [`CollectionChange`]s.

use crate::{
    listeners::{ListenerId, Listeners},
    CollectionName, Record, RecordFilter, RecordId,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Records keyed by identifier, iterated in first-insert order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    records: HashMap<RecordId, Record>,
    order: Vec<RecordId>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from records in fetch order.
    ///
    /// A repeated identifier replaces the earlier record in place.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut collection = Self::new();
        for record in records {
            collection.upsert(record);
        }
        collection
    }

    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or replace a record, returning the replaced one.
    ///
    /// A replaced record keeps its position.
    pub fn upsert(&mut self, record: Record) -> Option<Record> {
        let id = record.id.clone();
        let previous = self.records.insert(id.clone(), record);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    /// Remove a record by ID.
    pub fn remove(&mut self, id: &str) -> Option<Record> {
        let removed = self.records.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Records in order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Identifiers in order.
    pub fn ids(&self) -> &[RecordId] {
        &self.order
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }
}

/// Notification sent to readers after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange {
    Inserted(Record),
    Updated { previous: Record, current: Record },
    Removed(Record),
    /// Contents were replaced wholesale (initial seed or resync).
    Reset { len: usize },
}

impl CollectionChange {
    /// The identifier affected, if a single record changed.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            CollectionChange::Inserted(record) | CollectionChange::Removed(record) => {
                Some(&record.id)
            }
            CollectionChange::Updated { current, .. } => Some(&current.id),
            CollectionChange::Reset { .. } => None,
        }
    }
}

/// What a single write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Removed,
    /// The write left the collection as it was.
    Unchanged,
    /// The record did not match the collection filter and was not present.
    Filtered,
}

/// A shared, observable collection.
///
/// All methods take `&self`. The lock is released before listeners run, so a
/// listener may read the collection it is notified about.
#[derive(Debug)]
pub struct LiveCollection {
    name: CollectionName,
    filter: Option<RecordFilter>,
    state: RwLock<Collection>,
    listeners: Listeners<CollectionChange>,
    revision: AtomicU64,
}

impl LiveCollection {
    /// Create an empty collection.
    pub fn new(name: impl Into<CollectionName>) -> Self {
        Self {
            name: name.into(),
            filter: None,
            state: RwLock::new(Collection::new()),
            listeners: Listeners::new(),
            revision: AtomicU64::new(0),
        }
    }

    /// Create an empty collection that only keeps records matching `filter`.
    pub fn with_filter(name: impl Into<CollectionName>, filter: RecordFilter) -> Self {
        let mut collection = Self::new(name);
        if !filter.is_empty() {
            collection.filter = Some(filter);
        }
        collection
    }

    /// Create a new collection wrapped in Arc for sharing.
    pub fn new_shared(name: impl Into<CollectionName>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Get the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the local filter, if any.
    pub fn filter(&self) -> Option<&RecordFilter> {
        self.filter.as_ref()
    }

    /// Insert a record, replacing any record with the same identifier.
    pub fn write_insert(&self, record: Record) -> WriteOutcome {
        self.upsert(record)
    }

    /// Update a record. Unknown identifiers are inserted.
    pub fn write_update(&self, record: Record) -> WriteOutcome {
        self.upsert(record)
    }

    /// Remove a record. Absent identifiers are a no-op.
    pub fn write_delete(&self, id: &str) -> WriteOutcome {
        let removed = self.state.write().remove(id);
        match removed {
            Some(record) => {
                self.commit(CollectionChange::Removed(record));
                WriteOutcome::Removed
            }
            None => WriteOutcome::Unchanged,
        }
    }

    /// Replace the whole content, e.g. with a fresh list-fetch.
    pub fn reset(&self, records: impl IntoIterator<Item = Record>) -> usize {
        let fresh = Collection::from_records(
            records
                .into_iter()
                .filter(|record| self.accepts(record)),
        );
        let len = fresh.len();
        *self.state.write() = fresh;
        self.commit(CollectionChange::Reset { len });
        len
    }

    fn upsert(&self, record: Record) -> WriteOutcome {
        if !self.accepts(&record) {
            return match self.write_delete(&record.id) {
                WriteOutcome::Removed => WriteOutcome::Removed,
                _ => WriteOutcome::Filtered,
            };
        }

        let change = {
            let mut state = self.state.write();
            match state.get(&record.id) {
                Some(existing) if *existing == record => return WriteOutcome::Unchanged,
                _ => {}
            }
            match state.upsert(record.clone()) {
                None => CollectionChange::Inserted(record),
                Some(previous) => CollectionChange::Updated {
                    previous,
                    current: record,
                },
            }
        };

        let outcome = match change {
            CollectionChange::Inserted(_) => WriteOutcome::Inserted,
            _ => WriteOutcome::Updated,
        };
        self.commit(change);
        outcome
    }

    fn accepts(&self, record: &Record) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(record))
    }

    fn commit(&self, change: CollectionChange) {
        self.revision.fetch_add(1, Ordering::SeqCst);
        self.listeners.emit(&change);
    }

    /// Get a copy of a record.
    pub fn get(&self, id: &str) -> Option<Record> {
        self.state.read().get(id).cloned()
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &str) -> bool {
        self.state.read().contains(id)
    }

    /// Copy of all records in order.
    pub fn to_vec(&self) -> Vec<Record> {
        self.state.read().iter().cloned().collect()
    }

    /// Identifiers in order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.state.read().ids().to_vec()
    }

    /// Run `f` against the current content without copying it.
    pub fn read<R>(&self, f: impl FnOnce(&Collection) -> R) -> R {
        f(&self.state.read())
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// Number of mutations applied so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Register a change listener.
    pub fn on_change(
        &self,
        listener: impl Fn(&CollectionChange) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.on(listener)
    }

    /// Remove a change listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
