//! Subscription handles.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{RealtimeClient, RealtimeMessage};

/// A live realtime subscription.
///
/// Messages arrive in server order. Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    topic: String,
    receiver: mpsc::UnboundedReceiver<RealtimeMessage>,
    client: RealtimeClient,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        topic: String,
        receiver: mpsc::UnboundedReceiver<RealtimeMessage>,
        client: RealtimeClient,
    ) -> Self {
        Self {
            id,
            topic,
            receiver,
            client,
            active: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once unsubscribed, even if messages were still queued.
    pub async fn next(&mut self) -> Option<RealtimeMessage> {
        if !self.active {
            return None;
        }
        self.receiver.recv().await
    }

    /// Take an already received message without waiting.
    pub fn try_next(&mut self) -> Option<RealtimeMessage> {
        if !self.active {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Stop receiving messages. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.receiver.close();
        self.client.release(&self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// A subscription driving a callback on its own task.
///
/// Once [`unsubscribe`](Self::unsubscribe) returns, the handler is not called
/// again. Calling `unsubscribe` from inside the handler deadlocks.
#[derive(Debug)]
pub struct HandlerSubscription {
    id: String,
    topic: String,
    open: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl HandlerSubscription {
    pub(crate) fn spawn<F>(mut subscription: Subscription, handler: F) -> Self
    where
        F: Fn(RealtimeMessage) + Send + 'static,
    {
        let id = subscription.id().to_string();
        let topic = subscription.topic().to_string();
        let open = Arc::new(Mutex::new(true));

        let gate = Arc::clone(&open);
        let task = tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                if !deliver(&gate, &handler, message) {
                    break;
                }
            }
            subscription.unsubscribe();
        });

        Self {
            id,
            topic,
            open,
            task: Some(task),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        *self.open.lock()
    }

    /// Stop the handler. Waits for a handler call in progress. Idempotent.
    pub fn unsubscribe(&mut self) {
        *self.open.lock() = false;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HandlerSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Run the handler while the gate is open; the lock is held for the call.
fn deliver<F>(gate: &Mutex<bool>, handler: &F, message: RealtimeMessage) -> bool
where
    F: Fn(RealtimeMessage),
{
    let open = gate.lock();
    if !*open {
        return false;
    }
    handler(message);
    true
}
