//! Subscription registry.
//!
//! Tracks active subscriptions and routes incoming realtime events to the
//! channel of every subscription registered for the event's topic.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::RealtimeMessage;

/// Sender for realtime messages.
pub type MessageSender = mpsc::UnboundedSender<RealtimeMessage>;

/// A single subscription.
#[derive(Debug)]
pub struct SubscriptionEntry {
    /// Unique identifier for this subscription
    pub id: String,
    /// Topic the subscription listens to
    pub topic: String,
    /// Channel to deliver messages to the subscriber
    pub sender: MessageSender,
}

/// Registry of active subscriptions.
///
/// Thread-safe and can be shared across tasks via `Arc`.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// All active subscriptions, keyed by subscription ID.
    subscriptions: DashMap<String, SubscriptionEntry>,
    /// Index of subscriptions by topic.
    by_topic: DashMap<String, Vec<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            by_topic: DashMap::new(),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a subscription.
    ///
    /// Returns the subscription ID.
    pub fn register(&self, topic: String, sender: MessageSender) -> String {
        let sub_id = uuid::Uuid::new_v4().to_string();

        let entry = SubscriptionEntry {
            id: sub_id.clone(),
            topic: topic.clone(),
            sender,
        };

        self.subscriptions.insert(sub_id.clone(), entry);
        self.by_topic
            .entry(topic.clone())
            .or_default()
            .push(sub_id.clone());

        tracing::debug!(sub_id = %sub_id, topic = %topic, "Subscription registered");

        sub_id
    }

    /// Unregister a subscription.
    ///
    /// Returns `false` if it was not registered. Idempotent.
    pub fn unregister(&self, sub_id: &str) -> bool {
        let Some((_, entry)) = self.subscriptions.remove(sub_id) else {
            return false;
        };

        if let Some(mut ids) = self.by_topic.get_mut(&entry.topic) {
            ids.retain(|id| id != sub_id);
        }
        // Re-checked under the shard lock; a concurrent register may have
        // pushed a new id since the guard above was released.
        self.by_topic.remove_if(&entry.topic, |_, ids| ids.is_empty());

        tracing::debug!(sub_id = %sub_id, topic = %entry.topic, "Subscription unregistered");
        true
    }

    /// Deliver a message to every subscription of `topic`.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn dispatch(&self, topic: &str, message: RealtimeMessage) -> usize {
        let ids = match self.by_topic.get(topic) {
            Some(ids) => ids.clone(),
            None => return 0,
        };

        let mut sent_count = 0;
        for id in ids {
            if let Some(entry) = self.subscriptions.get(&id) {
                if entry.sender.send(message.clone()).is_ok() {
                    sent_count += 1;
                }
            }
        }

        sent_count
    }

    /// Deliver a message to every subscription.
    pub fn broadcast_all(&self, message: RealtimeMessage) -> usize {
        let mut sent_count = 0;

        for entry in self.subscriptions.iter() {
            if entry.value().sender.send(message.clone()).is_ok() {
                sent_count += 1;
            }
        }

        sent_count
    }

    /// Distinct topics with at least one subscription, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.by_topic.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn topic_count(&self) -> usize {
        self.by_topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
