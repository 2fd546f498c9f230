//! Realtime wire protocol.
//!
//! The BaaS realtime endpoint is a Server-Sent Events stream. The first event
//! (`PB_CONNECT`) hands out a client id; the client then posts the list of
//! topics it wants. Every change arrives as an event named after the topic it
//! matched, carrying `{"action": .., "record": ..}` as data.

use reqwest::Url;
use roost_engine::ChangeEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ClientError, Result};

/// Name of the handshake event.
pub const CONNECT_EVENT: &str = "PB_CONNECT";

/// Messages delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeMessage {
    /// A validated change to a record matching the topic.
    Change(ChangeEvent),
    /// The transport reconnected; events may have been missed.
    Resync,
}

/// Payload of the handshake event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPayload {
    pub client_id: String,
}

/// Body of the topic update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpdate<'a> {
    pub client_id: &'a str,
    pub subscriptions: Vec<String>,
}

/// Server-side narrowing of a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Filter expression evaluated by the server for each change
    pub filter: Option<String>,
    /// Relations to inline into each record
    pub expand: Option<String>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.expand.is_none()
    }
}

/// Build the topic string for a subscription.
///
/// `pattern` is `*` for every record of the collection or a record id.
/// Options travel URL-encoded in the topic itself, which is also the event
/// name the server uses when it delivers matching changes.
pub fn build_topic(collection: &str, pattern: &str, options: &SubscribeOptions) -> Result<String> {
    if collection.is_empty() || pattern.is_empty() {
        return Err(ClientError::Protocol(
            "topic needs a collection and a pattern".into(),
        ));
    }

    let base = format!("{}/{}", collection, pattern);
    if options.is_empty() {
        return Ok(base);
    }

    let mut query = serde_json::Map::new();
    if let Some(filter) = &options.filter {
        query.insert("filter".into(), json!(filter));
    }
    if let Some(expand) = &options.expand {
        query.insert("expand".into(), json!(expand));
    }
    let serialized = serde_json::to_string(&json!({ "query": query }))?;

    let encoded = Url::parse_with_params("http://topic.invalid/", &[("options", serialized)])
        .map_err(|e| ClientError::Protocol(e.to_string()))?;
    Ok(format!("{}?{}", base, encoded.query().unwrap_or_default()))
}

/// A single Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: String,
    pub data: String,
}

/// Incremental Server-Sent Events parser.
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence; only
/// complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
            } else {
                self.field(line);
            }
        }
        frames
    }

    fn field(&mut self, line: &str) {
        // comment / keep-alive
        if line.starts_with(':') {
            return;
        }

        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match name {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            id,
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
