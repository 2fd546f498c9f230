//! In-process fake BaaS for end-to-end tests.
//!
//! Serves the record list endpoint and the realtime SSE endpoint from memory.
//! Tests drive it directly: `create`/`update`/`delete` change the stored
//! records and push the matching realtime event; the `*_silently` variants
//! change the store without an event, and `kick` drops every realtime
//! connection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{stream, Stream, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Collection whose list endpoint always answers 403.
pub const FORBIDDEN: &str = "forbidden";

/// Runs once while a list request is in flight, after its page was read.
type ListHook = Box<dyn FnOnce(&FakeBaas) + Send>;

#[derive(Clone)]
pub struct FakeBaas {
    inner: Arc<Inner>,
}

struct Inner {
    records: Mutex<HashMap<String, Vec<Value>>>,
    topics: Mutex<Vec<String>>,
    /// (collection, raw event data)
    events: broadcast::Sender<(String, String)>,
    kick: broadcast::Sender<()>,
    connections: AtomicUsize,
    topic_posts: AtomicUsize,
    list_requests: AtomicUsize,
    auth_headers: Mutex<Vec<Option<String>>>,
    failing_lists: AtomicUsize,
    during_list: Mutex<Option<ListHook>>,
    stall_lists: AtomicBool,
    stall_realtime: AtomicBool,
}

impl FakeBaas {
    fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        let (kick, _) = broadcast::channel(4);

        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(HashMap::new()),
                topics: Mutex::new(Vec::new()),
                events,
                kick,
                connections: AtomicUsize::new(0),
                topic_posts: AtomicUsize::new(0),
                list_requests: AtomicUsize::new(0),
                auth_headers: Mutex::new(Vec::new()),
                failing_lists: AtomicUsize::new(0),
                during_list: Mutex::new(None),
                stall_lists: AtomicBool::new(false),
                stall_realtime: AtomicBool::new(false),
            }),
        }
    }

    /// Start the server on an ephemeral port; returns its base URL.
    pub async fn spawn() -> (Self, String) {
        let baas = Self::new();

        let app = Router::new()
            .route("/api/collections/{collection}/records", get(list_records))
            .route("/api/realtime", get(realtime_connect).post(realtime_subscribe))
            .with_state(baas.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (baas, format!("http://{}", addr))
    }

    // ========================================================================
    // Store
    // ========================================================================

    pub fn seed(&self, collection: &str, records: Vec<Value>) {
        self.inner
            .records
            .lock()
            .insert(collection.to_string(), records);
    }

    pub fn upsert_silently(&self, collection: &str, record: Value) {
        let mut records = self.inner.records.lock();
        let items = records.entry(collection.to_string()).or_default();
        match items.iter_mut().find(|item| item["id"] == record["id"]) {
            Some(existing) => *existing = record,
            None => items.push(record),
        }
    }

    pub fn delete_silently(&self, collection: &str, id: &str) {
        if let Some(items) = self.inner.records.lock().get_mut(collection) {
            items.retain(|item| item["id"] != id);
        }
    }

    // ========================================================================
    // Realtime
    // ========================================================================

    pub fn create(&self, collection: &str, record: Value) {
        self.upsert_silently(collection, record.clone());
        self.emit(collection, json!({"action": "create", "record": record}));
    }

    pub fn update(&self, collection: &str, record: Value) {
        self.upsert_silently(collection, record.clone());
        self.emit(collection, json!({"action": "update", "record": record}));
    }

    pub fn delete(&self, collection: &str, id: &str) {
        let record = self
            .inner
            .records
            .lock()
            .get(collection)
            .and_then(|items| items.iter().find(|item| item["id"] == id).cloned())
            .unwrap_or_else(|| json!({"id": id}));
        self.delete_silently(collection, id);
        self.emit(collection, json!({"action": "delete", "record": record}));
    }

    pub fn emit(&self, collection: &str, event: Value) {
        self.emit_raw(collection, &event.to_string());
    }

    /// Push arbitrary data to every topic of `collection`.
    pub fn emit_raw(&self, collection: &str, data: &str) {
        let _ = self
            .inner
            .events
            .send((collection.to_string(), data.to_string()));
    }

    /// Drop every open realtime stream.
    pub fn kick(&self) {
        let _ = self.inner.kick.send(());
    }

    // ========================================================================
    // Faults
    // ========================================================================

    /// Answer the next `count` list requests with 503.
    pub fn fail_next_lists(&self, count: usize) {
        self.inner.failing_lists.store(count, Ordering::SeqCst);
    }

    /// Run `hook` during the next list request, after its page was read.
    /// The response is then held back briefly.
    pub fn during_next_list(&self, hook: impl FnOnce(&FakeBaas) + Send + 'static) {
        *self.inner.during_list.lock() = Some(Box::new(hook));
    }

    /// Never answer list requests.
    pub fn stall_lists(&self) {
        self.inner.stall_lists.store(true, Ordering::SeqCst);
    }

    /// Never answer realtime connects.
    pub fn stall_realtime(&self) {
        self.inner.stall_realtime.store(true, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.inner
            .failing_lists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn topics(&self) -> Vec<String> {
        self.inner.topics.lock().clone()
    }

    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn topic_posts(&self) -> usize {
        self.inner.topic_posts.load(Ordering::SeqCst)
    }

    pub fn list_requests(&self) -> usize {
        self.inner.list_requests.load(Ordering::SeqCst)
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.inner.auth_headers.lock().clone()
    }

    fn record_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.inner.auth_headers.lock().push(value);
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_records(
    State(baas): State<FakeBaas>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    baas.record_auth(&headers);
    baas.inner.list_requests.fetch_add(1, Ordering::SeqCst);

    if baas.inner.stall_lists.load(Ordering::SeqCst) {
        std::future::pending::<()>().await;
    }

    if baas.take_failure() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"code": 503, "message": "Try again later.", "data": {}})),
        )
            .into_response();
    }

    if collection == FORBIDDEN {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "code": 403,
                "message": "Only admins can perform this action.",
                "data": {}
            })),
        )
            .into_response();
    }

    let page: usize = params
        .get("page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1)
        .max(1);
    let per_page: usize = params
        .get("perPage")
        .and_then(|p| p.parse().ok())
        .unwrap_or(30)
        .max(1);

    let items = baas
        .inner
        .records
        .lock()
        .get(&collection)
        .cloned()
        .unwrap_or_default();
    let total_items = items.len();
    let total_pages = total_items.div_ceil(per_page);
    let page_items: Vec<Value> = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();

    let hook = baas.inner.during_list.lock().take();
    if let Some(hook) = hook {
        hook(&baas);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Json(json!({
        "page": page,
        "perPage": per_page,
        "totalItems": total_items,
        "totalPages": total_pages,
        "items": page_items,
    }))
    .into_response()
}

async fn realtime_connect(
    State(baas): State<FakeBaas>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    baas.record_auth(&headers);
    if baas.inner.stall_realtime.load(Ordering::SeqCst) {
        std::future::pending::<()>().await;
    }
    let n = baas.inner.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let client_id = format!("client-{}", n);

    // A new client starts without topics.
    baas.inner.topics.lock().clear();

    let connect = Event::default()
        .id(client_id.clone())
        .event("PB_CONNECT")
        .data(json!({ "clientId": client_id }).to_string());

    let state = baas.clone();
    let changes = BroadcastStream::new(baas.inner.events.subscribe())
        .filter_map(|message| async move { message.ok() })
        .flat_map(move |(collection, data)| {
            let prefix = format!("{}/", collection);
            let events: Vec<Result<Event, Infallible>> = state
                .topics()
                .into_iter()
                .filter(|topic| topic.starts_with(&prefix))
                .map(|topic| Ok(Event::default().event(topic).data(data.clone())))
                .collect();
            stream::iter(events)
        });

    let mut kick = baas.inner.kick.subscribe();
    let stream = stream::iter(vec![Ok(connect)])
        .chain(changes)
        .take_until(async move {
            let _ = kick.recv().await;
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeBody {
    #[allow(dead_code)]
    client_id: String,
    #[serde(default)]
    subscriptions: Vec<String>,
}

async fn realtime_subscribe(
    State(baas): State<FakeBaas>,
    headers: HeaderMap,
    Json(body): Json<SubscribeBody>,
) -> StatusCode {
    baas.record_auth(&headers);
    *baas.inner.topics.lock() = body.subscriptions;
    baas.inner.topic_posts.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

pub fn message(id: &str, body: &str) -> Value {
    json!({
        "id": id,
        "collectionName": "messages",
        "created": "2024-05-01 10:00:00.000Z",
        "updated": "2024-05-01 10:00:00.000Z",
        "body": body,
    })
}

pub fn inquiry(id: &str, property: &str, kind: &str) -> Value {
    json!({
        "id": id,
        "collectionName": "messages",
        "created": "2024-05-01 10:00:00.000Z",
        "updated": "2024-05-01 10:00:00.000Z",
        "body": format!("{} about {}", kind, property),
        "sender": "user_1",
        "property": property,
        "parent": "",
        "type": kind,
        "status": "unread",
        "expand": {"sender": {"id": "user_1", "name": "Dana"}}
    })
}
