//! Inbound channel listener - drains the delivery channel into waiters.

use crate::correlation::PendingRequests;
use crate::error::ListenerError;
use crate::runtime::Shutdown;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

/// Attribute names carried by every reply on the queue.
pub mod attributes {
    pub const APP_ID: &str = "appId";
    pub const REQUEST_ID: &str = "id";
}

/// A reply from the wallet. Read only; the channel owns delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub app_id: String,
    pub request_id: String,
    pub body: String,
}

impl InboundMessage {
    pub fn new(app_id: impl Into<String>, request_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self { app_id: app_id.into(), request_id: request_id.into(), body: body.into() }
    }

    /// Build from a queue attribute map; both `appId` and `id` are required.
    pub fn from_attributes(attrs: &HashMap<String, String>, body: impl Into<String>) -> Result<Self, ListenerError> {
        let get = |key: &str| {
            attrs
                .get(key)
                .cloned()
                .ok_or_else(|| ListenerError::Malformed(format!("missing attribute {key}")))
        };
        Ok(Self { app_id: get(attributes::APP_ID)?, request_id: get(attributes::REQUEST_ID)?, body: body.into() })
    }
}

/// Asynchronous delivery channel carrying wallet replies.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Next message; `Ok(None)` once the channel is closed for good.
    async fn recv(&self) -> Result<Option<InboundMessage>, ListenerError>;
}

/// In-process delivery channel.
pub struct MemoryChannel {
    rx: Mutex<mpsc::UnboundedReceiver<Result<InboundMessage, ListenerError>>>,
}

/// Producer side of a [`MemoryChannel`].
#[derive(Clone)]
pub struct MemorySender {
    tx: mpsc::UnboundedSender<Result<InboundMessage, ListenerError>>,
}

impl MemoryChannel {
    pub fn new() -> (MemorySender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemorySender { tx }, Self { rx: Mutex::new(rx) })
    }
}

impl MemorySender {
    pub fn deliver(&self, message: InboundMessage) -> bool {
        self.tx.send(Ok(message)).is_ok()
    }

    /// Inject a transport failure, as a flaky queue would.
    pub fn fail(&self, err: ListenerError) -> bool {
        self.tx.send(Err(err)).is_ok()
    }
}

#[async_trait]
impl DeliveryChannel for MemoryChannel {
    async fn recv(&self) -> Result<Option<InboundMessage>, ListenerError> {
        match self.rx.lock().await.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

/// Listener wiring: what to drain, whom it belongs to, where errors go.
pub struct Listener {
    pub channel: Arc<dyn DeliveryChannel>,
    pub app_id: String,
    pub pending: Arc<PendingRequests>,
    pub errors: broadcast::Sender<ListenerError>,
    pub shutdown: Shutdown,
    pub backoff: Duration,
}

impl Listener {
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut stop = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            return;
        }
        tracing::info!(app_id = %self.app_id, "listener started");
        loop {
            let next = tokio::select! {
                _ = stop.recv() => break,
                next = self.channel.recv() => next,
            };
            match next {
                Ok(Some(message)) => self.route(message),
                Ok(None) => {
                    tracing::info!("delivery channel closed");
                    break;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "delivery channel error");
                    let _ = self.errors.send(err);
                    tokio::select! {
                        _ = stop.recv() => break,
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                }
            }
        }
        tracing::info!(app_id = %self.app_id, "listener stopped");
    }

    fn route(&self, message: InboundMessage) {
        if message.app_id != self.app_id {
            tracing::trace!(app_id = %message.app_id, "message for another client");
            return;
        }
        let payload = json!({ "result": message.body });
        if self.pending.resolve(&message.request_id, payload) {
            tracing::debug!(id = %message.request_id, "request resolved");
        } else {
            tracing::debug!(id = %message.request_id, "no waiter for reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        sender: MemorySender,
        pending: Arc<PendingRequests>,
        errors: broadcast::Receiver<ListenerError>,
        shutdown: Shutdown,
        handle: JoinHandle<()>,
    }

    fn start() -> Harness {
        let (sender, channel) = MemoryChannel::new();
        let pending = PendingRequests::new();
        let (errors_tx, errors) = broadcast::channel(8);
        let shutdown = Shutdown::new();
        let handle = Listener {
            channel: Arc::new(channel),
            app_id: "me".into(),
            pending: pending.clone(),
            errors: errors_tx,
            shutdown: shutdown.clone(),
            backoff: Duration::from_millis(1),
        }
        .spawn();
        Harness { sender, pending, errors, shutdown, handle }
    }

    #[test]
    fn message_from_attributes() {
        let mut attrs = HashMap::new();
        attrs.insert("appId".to_string(), "me".to_string());
        attrs.insert("id".to_string(), "3".to_string());
        let msg = InboundMessage::from_attributes(&attrs, "sig").unwrap();
        assert_eq!(msg, InboundMessage::new("me", "3", "sig"));

        attrs.remove("id");
        assert!(matches!(
            InboundMessage::from_attributes(&attrs, "sig"),
            Err(ListenerError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn routes_matching_messages() {
        let h = start();
        let waiter = h.pending.register("1");
        h.sender.deliver(InboundMessage::new("me", "1", "signed"));
        let reply = waiter.wait(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(reply, json!({"result": "signed"}));
    }

    #[tokio::test]
    async fn foreign_app_messages_are_discarded() {
        let h = start();
        let waiter = h.pending.register("1");
        h.sender.deliver(InboundMessage::new("someone-else", "1", "stolen"));
        h.sender.deliver(InboundMessage::new("me", "1", "mine"));
        let reply = waiter.wait(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(reply, json!({"result": "mine"}));
    }

    #[tokio::test]
    async fn errors_are_published_and_loop_survives() {
        let mut h = start();
        h.sender.fail(ListenerError::Transport("boom".into()));
        let err = tokio::time::timeout(Duration::from_secs(1), h.errors.recv()).await.unwrap().unwrap();
        assert_eq!(err.to_string(), "transport: boom");

        let waiter = h.pending.register("2");
        h.sender.deliver(InboundMessage::new("me", "2", "after"));
        assert!(waiter.wait(Some(Duration::from_secs(1))).await.is_ok());
        assert!(!h.handle.is_finished());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let h = start();
        h.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_channel_stops_the_loop() {
        let h = start();
        drop(h.sender);
        tokio::time::timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
    }
}
