//! Forwarding of notifications to an upstream WebSocket peer.
//!
//! The forwarder subscribes to the [`Broadcaster`] once and keeps that
//! subscription for its whole life. Its task connects to the peer, sends
//! every notification as a text frame, and reconnects with backoff when
//! the connection drops. Notifications published while disconnected are
//! dropped; the peer gets no replay.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use cardbridge_core::{Backoff, SubscriberId};

use crate::broadcaster::Broadcaster;
use crate::error::NetworkError;
use crate::subscriber::ChannelSubscriber;

const PEER_QUEUE_CAPACITY: usize = 256;

/// Spawns the peer forwarding task.
#[derive(Debug, Clone)]
pub struct PeerForwarder {
    url: String,
    backoff: Backoff,
}

impl PeerForwarder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Subscribe to `broadcaster` and start forwarding.
    ///
    /// The task ends when the subscription is removed from the broadcaster.
    pub fn spawn(self, broadcaster: &Broadcaster) -> (SubscriberId, JoinHandle<()>) {
        let (subscriber, rx) = ChannelSubscriber::channel(PEER_QUEUE_CAPACITY);
        let id = broadcaster.subscribe(subscriber.with_kind("peer"));
        info!(peer = %self.url, subscriber = %id, "Peer forwarder started");
        let task = tokio::spawn(run(self.url, rx, self.backoff));
        (id, task)
    }
}

/// Why a connected session with the peer ended.
enum SessionEnd {
    Lost(NetworkError),
    Unsubscribed,
}

async fn run(url: String, mut rx: mpsc::Receiver<String>, mut backoff: Backoff) {
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(peer = %url, "Connected to peer");
                backoff.reset();
                match forward(stream, &mut rx).await {
                    SessionEnd::Unsubscribed => return,
                    SessionEnd::Lost(e) => warn!(peer = %url, error = %e, "Peer connection lost"),
                }
            }
            Err(e) => warn!(peer = %url, error = %e, "Peer connection failed"),
        }

        let delay = backoff.next_delay();
        debug!(peer = %url, delay_ms = delay.as_millis() as u64, "Reconnecting to peer");
        if !drain_for(delay, &mut rx).await {
            return;
        }
    }
}

async fn forward<S>(stream: S, rx: &mut mpsc::Receiver<String>) -> SessionEnd
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        return SessionEnd::Lost(e.into());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return SessionEnd::Unsubscribed;
                }
            },
            incoming = source.next() => match incoming {
                // Frames from the peer are not relayed.
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Lost(e.into()),
                None => return SessionEnd::Lost(NetworkError::Peer("closed by peer".to_string())),
            },
        }
    }
}

/// Wait `delay`, discarding queued notifications. Returns `false` if the
/// subscription is gone.
async fn drain_for(delay: Duration, rx: &mut mpsc::Receiver<String>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            msg = rx.recv() => match msg {
                Some(_) => trace!("Dropping notification while peer is disconnected"),
                None => return false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_discards_and_detects_close() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send("a".to_string()).await.unwrap();
        assert!(drain_for(Duration::from_millis(5), &mut rx).await);
        assert!(rx.try_recv().is_err());

        drop(tx);
        assert!(!drain_for(Duration::from_secs(5), &mut rx).await);
    }

    #[tokio::test]
    async fn test_forwarder_stops_when_unsubscribed() {
        let broadcaster = Broadcaster::new();
        // Nothing listens on port 9; the task keeps retrying.
        let forwarder = PeerForwarder::new("ws://127.0.0.1:9/")
            .with_backoff(Backoff::new(Duration::from_millis(5), Duration::from_millis(10)));
        let (id, task) = forwarder.spawn(&broadcaster);
        assert_eq!(broadcaster.len(), 1);

        broadcaster.unsubscribe(id);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("forwarder should stop")
            .unwrap();
    }
}
