//! # Roost Engine
//!
//! Client-side synchronized collections for realtime record feeds.
//!
//! A BaaS pushes `create`, `update` and `delete` events for records of a
//! collection. This crate keeps a local copy of that collection consistent
//! by applying those events, and lets any number of readers observe it.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches the network; the client crate feeds it
//! - **Upsert semantics**: create and update collapse to one insert-or-replace
//! - **Last write wins**: events are applied strictly in arrival order
//! - **Safe to share**: collections are `Send + Sync` and notify listeners
//!   outside their lock
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] has a stable identifier, the system fields the BaaS attaches
//! (collection, timestamps, expanded relations) and arbitrary JSON fields.
//!
//! ### Change events
//!
//! [`ChangeEvent`] is the validated form of a wire event
//! ([`RawChangeEvent`]). Events without an identifier are rejected.
//!
//! ### Live collections
//!
//! [`LiveCollection`] maps identifiers to records, remembers fetch order,
//! counts revisions, and reports every mutation as a [`CollectionChange`].
//! An optional [`RecordFilter`] keeps non-matching records out.
//!
//! ### Applying events
//!
//! [`EventApplier`] maps each event to exactly one collection write and can
//! be detached so that late events never touch the collection.
//!
//! ## Quick Start
//!
//! ```rust
//! use roost_engine::{Applied, ChangeEvent, EventApplier, LiveCollection, Record};
//!
//! // 1. Seed the collection from an initial fetch
//! let collection = LiveCollection::new_shared("messages");
//! collection.reset(vec![Record::new("a", "messages").with_field("body", "hi")]);
//!
//! // 2. Apply live events as they arrive
//! let applier = EventApplier::new(collection.clone());
//! let created = Record::new("b", "messages").with_field("body", "yo");
//! assert_eq!(applier.apply(ChangeEvent::Created(created)), Applied::Inserted);
//! applier.apply(ChangeEvent::deleted("a"));
//!
//! // 3. Read the current state
//! assert_eq!(collection.ids(), vec!["b".to_string()]);
//!
//! // 4. Stop on teardown
//! applier.detach();
//! assert_eq!(applier.apply(ChangeEvent::deleted("b")), Applied::Detached);
//! ```

pub mod apply;
pub mod collection;
pub mod error;
pub mod event;
pub mod filter;
pub mod listeners;
pub mod record;

// Re-export main types at crate root
pub use apply::{Applied, EventApplier};
pub use collection::{Collection, CollectionChange, LiveCollection, WriteOutcome};
pub use error::Error;
pub use event::{ChangeAction, ChangeEvent, RawChangeEvent};
pub use filter::{FieldCondition, FieldMatch, RecordFilter};
pub use listeners::{ListenerId, Listeners};
pub use record::Record;

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
