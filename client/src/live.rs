//! Live query sessions.
//!
//! A [`LiveQuery`] keeps a [`LiveCollection`] in sync with a remote
//! collection: it subscribes first, seeds the collection from a full list
//! fetch, replays whatever arrived during the fetch, and then applies live
//! events in arrival order until stopped.

use std::sync::Arc;

use roost_engine::{Applied, EventApplier, LiveCollection, Record, RecordFilter};
use tokio::task::JoinHandle;

use crate::api::{BaasClient, ListQuery};
use crate::error::Result;
use crate::inquiry::INQUIRY_COLLECTION;
use crate::realtime::{RealtimeMessage, SubscribeOptions, Subscription};

/// What a live query fetches and follows.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveQueryConfig {
    /// Remote collection name
    pub collection: String,
    /// `*` or a single record id
    pub pattern: String,
    /// Server-side filter for the fetch and the subscription
    pub filter: Option<String>,
    /// Relations to inline
    pub expand: Option<String>,
    /// Sort expression for the initial fetch
    pub sort: Option<String>,
    /// Page size override for the initial fetch
    pub page_size: Option<u32>,
    /// Local filter applied to every write
    pub local_filter: Option<RecordFilter>,
}

impl LiveQueryConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            pattern: "*".to_string(),
            filter: None,
            expand: None,
            sort: None,
            page_size: None,
            local_filter: None,
        }
    }

    /// Inquiry threads about one property, oldest first, with sender and
    /// property inlined.
    pub fn inquiries(property_id: &str) -> Self {
        Self::new(INQUIRY_COLLECTION)
            .filter(format!(r#"property = {} && type = "parent""#, quote(property_id)))
            .expand("sender,property")
            .sort("created")
            .local_filter(
                RecordFilter::new()
                    .eq("property", property_id)
                    .eq("type", "parent"),
            )
    }

    /// Follow a single record.
    pub fn record(mut self, id: impl Into<String>) -> Self {
        self.pattern = id.into();
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn local_filter(mut self, filter: RecordFilter) -> Self {
        self.local_filter = Some(filter);
        self
    }

    fn subscribe_options(&self) -> SubscribeOptions {
        SubscribeOptions {
            filter: self.filter.clone(),
            expand: self.expand.clone(),
        }
    }

    fn list_query(&self) -> ListQuery {
        let mut query = ListQuery {
            per_page: self.page_size,
            sort: self.sort.clone(),
            filter: self.filter.clone(),
            expand: self.expand.clone(),
            ..ListQuery::default()
        };
        if self.pattern != "*" {
            let id = quote(&self.pattern);
            query.filter = Some(match query.filter {
                Some(filter) => format!("({}) && id = {}", filter, id),
                None => format!("id = {}", id),
            });
        }
        query
    }

    /// An empty collection for this query, carrying its local filter.
    ///
    /// Register listeners on it before handing it to
    /// [`LiveQuery::start_with`] to observe the initial seed as well.
    pub fn new_collection(&self) -> Arc<LiveCollection> {
        Arc::new(match &self.local_filter {
            Some(filter) => LiveCollection::with_filter(&self.collection, filter.clone()),
            None => LiveCollection::new(&self.collection),
        })
    }
}

/// Double-quoted filter literal with `\` and `"` escaped.
fn quote(value: &str) -> String {
    format!(r#""{}""#, value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A running live query.
///
/// Readers share the collection through [`collection`](Self::collection).
/// Stopping, or dropping, the query guarantees no further event reaches it.
#[derive(Debug)]
pub struct LiveQuery {
    collection: Arc<LiveCollection>,
    applier: EventApplier,
    topic: String,
    task: Option<JoinHandle<()>>,
}

impl LiveQuery {
    /// Subscribe, seed, and start following `config`.
    ///
    /// Fails if the subscription cannot be established or the initial fetch
    /// fails; nothing keeps running in that case.
    pub async fn start(client: &BaasClient, config: LiveQueryConfig) -> Result<Self> {
        let collection = config.new_collection();
        Self::start_with(client, config, collection).await
    }

    /// Like [`start`](Self::start), writing into a caller-provided collection.
    ///
    /// The collection is reset by the initial fetch; its name and filter are
    /// taken as they are.
    pub async fn start_with(
        client: &BaasClient,
        config: LiveQueryConfig,
        collection: Arc<LiveCollection>,
    ) -> Result<Self> {
        let applier = EventApplier::new(Arc::clone(&collection));

        let mut subscription = client
            .realtime()
            .subscribe(&config.collection, &config.pattern, config.subscribe_options())
            .await?;

        let seeded = reseed(client, &config, &applier).await?;

        // Events that arrived while fetching, in order.
        let mut replayed = 0;
        let mut needs_resync = false;
        while let Some(message) = subscription.try_next() {
            match message {
                RealtimeMessage::Change(event) => {
                    applier.apply(event);
                    replayed += 1;
                }
                RealtimeMessage::Resync => needs_resync = true,
            }
        }
        // The stream reconnected during the fetch; the seed may be stale.
        if needs_resync {
            reseed(client, &config, &applier).await?;
        }

        let topic = subscription.topic().to_string();
        tracing::info!(
            collection = %config.collection,
            topic = %topic,
            seeded,
            replayed,
            "Live query started"
        );

        let task = tokio::spawn(follow(client.clone(), config, subscription, applier.clone()));

        Ok(Self {
            collection,
            applier,
            topic,
            task: Some(task),
        })
    }

    /// The synchronized collection.
    pub fn collection(&self) -> &Arc<LiveCollection> {
        &self.collection
    }

    /// Snapshot of the current records.
    pub fn records(&self) -> Vec<Record> {
        self.collection.to_vec()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_running(&self) -> bool {
        self.applier.is_attached()
    }

    /// Detach, unsubscribe, and end the apply loop. Idempotent.
    pub fn stop(&mut self) {
        self.applier.detach();
        if let Some(task) = self.task.take() {
            // Dropping the task's subscription unsubscribes.
            task.abort();
            tracing::info!(
                collection = %self.collection.name(),
                topic = %self.topic,
                "Live query stopped"
            );
        }
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fetch the full result set and replace the collection with it.
async fn reseed(
    client: &BaasClient,
    config: &LiveQueryConfig,
    applier: &EventApplier,
) -> Result<usize> {
    let records = client
        .list_all(&config.collection, &config.list_query())
        .await?;
    Ok(applier.reset(records).unwrap_or(0))
}

/// Refetch until a reset succeeds, backing off between attempts.
///
/// Messages queue in the subscription meanwhile and are applied on top of
/// the fresh content. Returns `false` once the applier is detached.
async fn resync(client: &BaasClient, config: &LiveQueryConfig, applier: &EventApplier) -> bool {
    let mut attempt: u32 = 0;

    while applier.is_attached() {
        match reseed(client, config, applier).await {
            Ok(records) => {
                tracing::info!(collection = %config.collection, records, "Resynchronized");
                return applier.is_attached();
            }
            Err(e) => {
                attempt = attempt.saturating_add(1);
                let delay = client.config().backoff(attempt);
                tracing::warn!(
                    collection = %config.collection,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Resync failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    false
}

/// Apply live messages until the subscription ends or the applier detaches.
async fn follow(
    client: BaasClient,
    config: LiveQueryConfig,
    mut subscription: Subscription,
    applier: EventApplier,
) {
    while let Some(message) = subscription.next().await {
        match message {
            RealtimeMessage::Change(event) => {
                let record_id = event.record_id().to_string();
                let action = event.action();
                let applied = applier.apply(event);

                tracing::debug!(
                    collection = %config.collection,
                    record_id = %record_id,
                    action = %action,
                    applied = ?applied,
                    "Applied change"
                );

                if applied == Applied::Detached {
                    break;
                }
            }
            RealtimeMessage::Resync => {
                if !resync(&client, &config, &applier).await {
                    break;
                }
            }
        }
    }

    subscription.unsubscribe();
    tracing::debug!(collection = %config.collection, "Live query loop ended");
}
