//! Notification sinks.
//!
//! A [`Subscriber`] receives every forwarded notification as JSON text.
//! Delivery is synchronous and must not block: the broadcaster calls it
//! while holding its subscriber lock.

use tokio::sync::mpsc;
use tracing::info;

use crate::error::DeliveryError;

/// Endpoint that receives broadcast notifications.
pub trait Subscriber: Send {
    /// Hand one serialized notification to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] if the endpoint is gone or cannot keep up.
    fn deliver(&self, text: &str) -> Result<(), DeliveryError>;

    /// Short label for logs.
    fn kind(&self) -> &'static str {
        "subscriber"
    }
}

/// Subscriber backed by a bounded channel.
///
/// Used for WebSocket connections and the peer forwarder: a task on the
/// other end of the channel owns the socket. A full queue counts as a
/// failed delivery, so a stalled client is dropped instead of slowing
/// everyone else down.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::Sender<String>,
    kind: &'static str,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            kind: "channel",
        }
    }

    /// Create a subscriber and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Label this subscriber in logs.
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }
}

impl Subscriber for ChannelSubscriber {
    fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.tx.try_send(text.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn kind(&self) -> &'static str {
        self.kind
    }
}

/// Console sink: writes every notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSubscriber;

impl Subscriber for LogSubscriber {
    fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        info!(target: "cardbridge::console", notification = %text, "Notification");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_subscriber_delivers() {
        let (subscriber, mut rx) = ChannelSubscriber::channel(4);
        subscriber.deliver("hello").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[test]
    fn test_channel_subscriber_full_queue() {
        let (subscriber, _rx) = ChannelSubscriber::channel(1);
        subscriber.deliver("one").unwrap();
        assert_eq!(subscriber.deliver("two"), Err(DeliveryError::QueueFull));
    }

    #[test]
    fn test_channel_subscriber_closed() {
        let (subscriber, rx) = ChannelSubscriber::channel(1);
        drop(rx);
        assert_eq!(subscriber.deliver("one"), Err(DeliveryError::Closed));
    }

    #[test]
    fn test_log_subscriber_never_fails() {
        assert!(LogSubscriber.deliver("{}").is_ok());
        assert_eq!(LogSubscriber.kind(), "console");
    }
}
