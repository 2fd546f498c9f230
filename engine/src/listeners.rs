//! Listener registry used to notify collection readers.
//!
//! Callbacks are stored behind `Arc` so that `emit` can copy the current set
//! and release the lock before running any of them. A callback may therefore
//! register or remove listeners while it runs; such changes take effect from
//! the next `emit`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`Listeners::on`], used to remove the listener again.
pub type ListenerId = u64;

type Callback<T> = dyn Fn(&T) + Send + Sync;

/// Typed synchronous listener set.
pub struct Listeners<T> {
    entries: Mutex<Vec<(ListenerId, Arc<Callback<T>>)>>,
    next_id: AtomicU64,
}

impl<T> Listeners<T> {
    /// Create an empty listener set.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback.
    pub fn on(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Unknown ids are ignored.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(lid, _)| *lid != id);
        entries.len() != before
    }

    /// Run every registered callback with `value`.
    pub fn emit(&self, value: &T) {
        let callbacks: Vec<Arc<Callback<T>>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for cb in callbacks {
            cb(value);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
