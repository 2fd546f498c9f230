//! Realtime change subscriptions.
//!
//! One [`RealtimeClient`] owns at most one Server-Sent Events connection to
//! the BaaS, opened with the first subscription and closed after the last one
//! goes away. Incoming events are routed by topic to every matching
//! [`Subscription`].

mod connection;
pub mod protocol;
pub mod registry;
mod subscription;

pub use protocol::{build_topic, RealtimeMessage, SseDecoder, SseFrame, SubscribeOptions};
pub use registry::SubscriptionRegistry;
pub use subscription::{HandlerSubscription, Subscription};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use connection::{Command, ConnectionHandle};

/// How often `subscribe` retries when the connection task exits under it.
const SUBSCRIBE_ATTEMPTS: usize = 3;

/// Subscribes to realtime record changes.
///
/// Cheap to clone; clones share the connection and the registry.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
    pub(crate) registry: SubscriptionRegistry,
    connection: Mutex<Option<ConnectionHandle>>,
}

impl RealtimeClient {
    pub(crate) fn new(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                http,
                config,
                registry: SubscriptionRegistry::new(),
                connection: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to changes of `collection` records matching `pattern`.
    ///
    /// `pattern` is `*` for the whole collection or a record id. Returns once
    /// the server has accepted the topic, so no change made afterwards is
    /// missed.
    pub async fn subscribe(
        &self,
        collection: &str,
        pattern: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription> {
        let topic = build_topic(collection, pattern, &options)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let sub_id = self.shared.registry.register(topic.clone(), tx);

        // Dropped on error, which unregisters it again.
        let subscription = Subscription::new(sub_id, topic, rx, self.clone());
        self.sync_topics().await?;

        tracing::info!(
            subscription_id = %subscription.id(),
            topic = %subscription.topic(),
            "Subscribed"
        );

        Ok(subscription)
    }

    /// Subscribe and run `handler` for every message until unsubscribed.
    pub async fn subscribe_with<F>(
        &self,
        collection: &str,
        pattern: &str,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<HandlerSubscription>
    where
        F: Fn(RealtimeMessage) + Send + 'static,
    {
        let subscription = self.subscribe(collection, pattern, options).await?;
        Ok(HandlerSubscription::spawn(subscription, handler))
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.registry.subscription_count()
    }

    /// Check if the connection task is running.
    pub fn is_connected(&self) -> bool {
        self.shared
            .connection
            .lock()
            .as_ref()
            .is_some_and(ConnectionHandle::is_running)
    }

    /// Ask the connection task to push the current topic set and wait until
    /// the server accepted it.
    async fn sync_topics(&self) -> Result<()> {
        for _ in 0..SUBSCRIBE_ATTEMPTS {
            let (ack, accepted) = oneshot::channel();
            self.command(Command::Subscribe(ack));

            match accepted.await {
                Ok(result) => return result.map_err(ClientError::Subscribe),
                // The task exited before answering; the next command restarts it.
                Err(_) => continue,
            }
        }
        Err(ClientError::Closed)
    }

    /// Forget a subscription and let the connection task update the server.
    pub(crate) fn release(&self, sub_id: &str) {
        if self.shared.registry.unregister(sub_id) {
            self.command(Command::Refresh);
            tracing::info!(subscription_id = %sub_id, "Unsubscribed");
        }
    }

    fn command(&self, command: Command) {
        let mut slot = self.shared.connection.lock();

        let command = match slot.as_ref() {
            Some(handle) => match handle.send(command) {
                Ok(()) => return,
                Err(command) => command,
            },
            None => command,
        };

        // A refresh with no task running has nothing to update.
        if matches!(command, Command::Refresh) {
            *slot = None;
            return;
        }

        let handle = connection::spawn(Arc::clone(&self.shared));
        if handle.send(command).is_err() {
            tracing::warn!("Realtime connection task exited immediately");
        }
        *slot = Some(handle);
    }
}
