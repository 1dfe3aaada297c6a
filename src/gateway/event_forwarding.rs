use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tracing::debug;

use crate::Result;

/// A dispatch frame on its way out of the gateway core, payload untouched.
#[derive(Debug)]
pub struct ForwardedEvent {
    pub shard_id: u16,
    pub event_type: String,
    pub seq: Option<u64>,
    pub data: Option<Box<RawValue>>,
}

/// The seam between the gateway core and the domain-model layer. Dispatch
/// handlers forward fire-and-forget; implementations must not assume the
/// shard waits on them.
#[async_trait]
pub trait EventForwarder: Send + Sync + 'static {
    async fn forward(&self, event: ForwardedEvent) -> Result<()>;
}

/// In-process forwarder routing by event name to mpsc subscribers. Events
/// nobody subscribed to are dropped; delivery is at-most-once per frame.
#[derive(Default)]
pub struct ChannelEventForwarder {
    subscriptions: RwLock<HashMap<String, mpsc::Sender<ForwardedEvent>>>,
}

impl ChannelEventForwarder {
    pub fn new() -> ChannelEventForwarder {
        ChannelEventForwarder::default()
    }

    /// Registers interest in one event name, replacing any prior subscriber
    /// for it.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        capacity: usize,
    ) -> mpsc::Receiver<ForwardedEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscriptions.write().insert(event_type.into(), tx);
        rx
    }
}

#[async_trait]
impl EventForwarder for ChannelEventForwarder {
    async fn forward(&self, event: ForwardedEvent) -> Result<()> {
        let subscriber = self.subscriptions.read().get(&event.event_type).cloned();

        match subscriber {
            Some(tx) => {
                if tx.send(event).await.is_err() {
                    debug!("event subscriber dropped its receiver");
                }
            }
            None => debug!(event_type = %event.event_type, "no subscriber, event dropped"),
        }

        Ok(())
    }
}

/// Swallows everything. Used in tests and for bring-up before any
/// collaborator is wired in.
pub struct NoopEventForwarder;

#[async_trait]
impl EventForwarder for NoopEventForwarder {
    async fn forward(&self, _event: ForwardedEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn event(event_type: &str, seq: u64) -> ForwardedEvent {
        ForwardedEvent {
            shard_id: 0,
            event_type: event_type.to_owned(),
            seq: Some(seq),
            data: None,
        }
    }

    #[tokio::test]
    async fn test_routes_to_subscriber() {
        let forwarder = ChannelEventForwarder::new();
        let mut rx = forwarder.subscribe("MESSAGE_CREATE", 16);

        forwarder.forward(event("MESSAGE_CREATE", 1)).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "MESSAGE_CREATE");
        assert_eq!(received.seq, Some(1));
    }

    #[tokio::test]
    async fn test_unsubscribed_event_dropped() {
        let forwarder = ChannelEventForwarder::new();
        let mut rx = forwarder.subscribe("MESSAGE_CREATE", 16);

        forwarder.forward(event("TYPING_START", 1)).await.unwrap();
        forwarder.forward(event("MESSAGE_CREATE", 2)).await.unwrap();

        // only the subscribed event came through
        let received = rx.recv().await.unwrap();
        assert_eq!(received.seq, Some(2));
        assert!(rx.try_recv().is_err());
    }
}
