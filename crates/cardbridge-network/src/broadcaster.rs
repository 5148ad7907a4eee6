//! Fan-out of notifications to subscribers.
//!
//! The broadcaster owns the subscriber set behind a mutex. `publish`
//! serializes a notification once and hands the text to every subscriber
//! in turn; a subscriber that fails is removed on the spot and the others
//! still receive the notification. Nothing is buffered for late joiners.
//!
//! Notifications from one publisher reach each subscriber in publish order:
//! delivery is a non-blocking enqueue performed under the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, trace, warn};

use cardbridge_core::SubscriberId;
use cardbridge_protocol::Notification;

use crate::subscriber::Subscriber;

/// Registry of subscribers and the `publish` fan-out.
///
/// # Example
///
/// ```
/// use cardbridge_network::{Broadcaster, ChannelSubscriber};
/// use cardbridge_protocol::{Notification, NotificationKind};
/// use cardbridge_core::CardId;
///
/// let broadcaster = Broadcaster::new();
/// let (subscriber, mut rx) = ChannelSubscriber::channel(8);
/// broadcaster.subscribe(subscriber);
///
/// let delivered = broadcaster.publish(&Notification::new(NotificationKind::CardScanned {
///     card_id: CardId::new("RF001234"),
/// }));
/// assert_eq!(delivered, 1);
/// assert!(rx.try_recv().unwrap().contains("card_scanned"));
/// ```
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<HashMap<SubscriberId, Box<dyn Subscriber>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. It receives notifications published from now on.
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> SubscriberId {
        let id = SubscriberId::new();
        let kind = subscriber.kind();
        let total = {
            let mut subscribers = self.lock();
            subscribers.insert(id, Box::new(subscriber));
            subscribers.len()
        };
        debug!(subscriber = %id, kind, total, "Subscriber added");
        id
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    /// Deliver a notification to every subscriber.
    ///
    /// Local-only notifications (warnings, diagnostics) are skipped. Returns
    /// the number of subscribers that accepted the notification; failing
    /// subscribers are removed and never reported to the caller.
    pub fn publish(&self, notification: &Notification) -> usize {
        if !notification.is_forwarded() {
            trace!(kind = notification.type_name(), "Not forwarding local notification");
            return 0;
        }

        let text = match notification.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(kind = notification.type_name(), error = %e, "Failed to serialize notification");
                return 0;
            }
        };

        let mut subscribers = self.lock();
        let mut failed = Vec::new();
        for (id, subscriber) in subscribers.iter() {
            if let Err(e) = subscriber.deliver(&text) {
                warn!(subscriber = %id, kind = subscriber.kind(), error = %e, "Delivery failed, removing subscriber");
                failed.push(*id);
            }
        }
        for id in &failed {
            subscribers.remove(id);
        }

        let delivered = subscribers.len();
        trace!(
            kind = notification.type_name(),
            delivered,
            removed = failed.len(),
            "Notification published"
        );
        delivered
    }

    /// Number of current subscribers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Box<dyn Subscriber>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.len())
            .finish()
    }
}
