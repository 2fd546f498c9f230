//! Realtime connection task.
//!
//! A single tokio task per [`RealtimeClient`](super::RealtimeClient) owns the
//! SSE stream. It:
//! 1. Opens `GET /api/realtime` and waits for the `PB_CONNECT` handshake
//! 2. Posts the registry's topic set
//! 3. Routes every event to the subscriptions of its topic
//! 4. Reconnects with backoff when the stream breaks, then asks every
//!    subscription to resync
//! 5. Exits once no subscription is left

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use roost_engine::ChangeEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::protocol::{
    ConnectPayload, RealtimeMessage, SseDecoder, SseFrame, SubscriptionUpdate, CONNECT_EVENT,
};
use super::Shared;
use crate::api::{authorize, check, endpoint};
use crate::error::{ClientError, Result};

/// Reply channel for a topic update; carries the failure message.
pub(crate) type Ack = oneshot::Sender<std::result::Result<(), String>>;

/// Requests from subscription handles to the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    /// The topic set changed; push it if connected.
    Refresh,
    /// The topic set changed; reply once the server has it.
    Subscribe(Ack),
}

/// Handle to a running connection task.
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Send a command, handing it back if the task is gone.
    pub(crate) fn send(&self, command: Command) -> std::result::Result<(), Command> {
        self.commands.send(command).map_err(|e| e.0)
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

pub(crate) fn spawn(shared: Arc<Shared>) -> ConnectionHandle {
    let (commands, receiver) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(shared, receiver));
    ConnectionHandle { commands, task }
}

/// Why the pump loop returned.
enum Ended {
    /// No subscriptions left.
    Idle,
    /// The stream broke or the server rejected the topics.
    Disconnected,
}

async fn run(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut waiting: Vec<Ack> = Vec::new();
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    loop {
        while let Ok(command) = commands.try_recv() {
            if let Command::Subscribe(ack) = command {
                waiting.push(ack);
            }
        }

        if shared.registry.is_empty() {
            resolve(&mut waiting, Ok(()));
            break;
        }

        let ended = match EventStream::connect(&shared).await {
            Ok(mut stream) => {
                attempt = 0;
                tracing::info!(
                    client_id = %stream.client_id,
                    topics = shared.registry.topic_count(),
                    "Realtime stream connected"
                );
                resolve(&mut waiting, Ok(()));

                if connected_before {
                    let recipients = shared.registry.broadcast_all(RealtimeMessage::Resync);
                    tracing::info!(recipients, "Realtime stream reconnected, resync requested");
                }
                connected_before = true;

                pump(&shared, &mut stream, &mut commands).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Realtime connection failed");
                resolve(&mut waiting, Err(e.to_string()));
                Ended::Disconnected
            }
        };

        if let Ended::Idle = ended {
            // Re-checked at the top: a subscribe may have raced the close.
            continue;
        }

        attempt = attempt.saturating_add(1);
        let delay = shared.config.backoff(attempt);
        tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting realtime stream"
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(Command::Subscribe(ack)) => waiting.push(ack),
                    Some(Command::Refresh) => {}
                    None => return,
                },
            }
        }
    }

    tracing::debug!("Realtime connection task finished");
}

/// Route events until the stream breaks or nothing is subscribed.
async fn pump(
    shared: &Shared,
    stream: &mut EventStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Ended {
    loop {
        tokio::select! {
            frame = stream.next_frame() => match frame {
                Ok(Some(frame)) => dispatch(shared, frame),
                Ok(None) => {
                    tracing::warn!(client_id = %stream.client_id, "Realtime stream ended");
                    return Ended::Disconnected;
                }
                Err(e) => {
                    tracing::warn!(client_id = %stream.client_id, error = %e, "Realtime stream error");
                    return Ended::Disconnected;
                }
            },
            command = commands.recv() => {
                let ack = match command {
                    Some(Command::Subscribe(ack)) => Some(ack),
                    Some(Command::Refresh) => None,
                    None => return Ended::Idle,
                };

                let result = post_topics(shared, &stream.client_id).await;
                let failure = result.as_ref().err().map(|e| e.to_string());
                if let Some(ack) = ack {
                    let _ = ack.send(failure.clone().map_or(Ok(()), Err));
                }

                if let Some(error) = failure {
                    tracing::warn!(client_id = %stream.client_id, error = %error, "Topic update rejected");
                    return Ended::Disconnected;
                }

                if shared.registry.is_empty() {
                    tracing::info!(client_id = %stream.client_id, "No subscriptions left, closing realtime stream");
                    return Ended::Idle;
                }
            }
        }
    }
}

fn dispatch(shared: &Shared, frame: SseFrame) {
    if frame.event == CONNECT_EVENT {
        return;
    }

    let event = match ChangeEvent::from_json(&frame.data) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(topic = %frame.event, error = %e, "Skipping malformed realtime event");
            return;
        }
    };

    let record_id = event.record_id().to_string();
    let delivered = shared
        .registry
        .dispatch(&frame.event, RealtimeMessage::Change(event));

    tracing::debug!(
        topic = %frame.event,
        record_id = %record_id,
        delivered,
        "Realtime event dispatched"
    );
}

async fn post_topics(shared: &Shared, client_id: &str) -> Result<()> {
    let url = endpoint(&shared.config, &["api", "realtime"])?;
    let update = SubscriptionUpdate {
        client_id,
        subscriptions: shared.registry.topics(),
    };

    let request = authorize(
        shared
            .http
            .post(url)
            .json(&update)
            .timeout(shared.config.request_timeout),
        &shared.config,
    );
    check(request.send().await?).await?;

    tracing::debug!(
        client_id = %client_id,
        topics = update.subscriptions.len(),
        "Topics posted"
    );
    Ok(())
}

fn resolve(waiting: &mut Vec<Ack>, result: std::result::Result<(), String>) {
    for ack in waiting.drain(..) {
        let _ = ack.send(result.clone());
    }
}

/// An open SSE stream past its handshake.
struct EventStream {
    client_id: String,
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
}

impl EventStream {
    /// Open the stream, complete the handshake, and post the topics.
    ///
    /// Opening and the handshake share one `connect_timeout` deadline.
    async fn connect(shared: &Shared) -> Result<Self> {
        let stream = tokio::time::timeout(shared.config.connect_timeout, Self::open(shared))
            .await
            .map_err(|_| ClientError::Protocol("timed out opening realtime stream".into()))??;

        post_topics(shared, &stream.client_id).await?;
        Ok(stream)
    }

    async fn open(shared: &Shared) -> Result<Self> {
        let url = endpoint(&shared.config, &["api", "realtime"])?;
        let request = authorize(
            shared.http.get(url).header(ACCEPT, "text/event-stream"),
            &shared.config,
        );
        let response = check(request.send().await?).await?;

        let mut stream = Self {
            client_id: String::new(),
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        };

        let client_id = stream.handshake().await?;
        stream.client_id = client_id;
        Ok(stream)
    }

    async fn handshake(&mut self) -> Result<String> {
        while let Some(frame) = self.next_frame().await? {
            if frame.event == CONNECT_EVENT {
                let payload: ConnectPayload = serde_json::from_str(&frame.data)?;
                return Ok(payload.client_id);
            }
        }
        Err(ClientError::Closed)
    }

    /// Next complete event; `None` when the server closed the stream.
    ///
    /// Cancel safe: decoded frames are queued before being returned.
    async fn next_frame(&mut self) -> Result<Option<SseFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.feed(&chunk)),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }
}
