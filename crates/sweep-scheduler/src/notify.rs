use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collaborators::NotificationSender;
use crate::types::Subscription;

/// Subscription lifecycle events sent to the notification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SubscriptionCreated,
    SubscriptionExpiringSoon,
    SubscriptionExpired,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SubscriptionCreated => "subscription_created",
            EventType::SubscriptionExpiringSoon => "subscription_expiring_soon",
            EventType::SubscriptionExpired => "subscription_expired",
        }
    }
}

/// One queued notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: String,
    pub event_type: EventType,
    pub payload: Value,
}

impl NotificationEvent {
    pub fn for_subscription(event_type: EventType, sub: &Subscription) -> Self {
        Self {
            user_id: sub.user_id.clone(),
            event_type,
            payload: json!({
                "subscription_id": sub.id,
                "order_id": sub.order_id,
                "start_date": sub.start_date,
                "end_date": sub.end_date,
                "next_planned_date": sub.next_planned_date,
                "status": sub.status,
            }),
        }
    }
}

/// Fire-and-forget handle onto the bounded notification queue.
///
/// `notify` never blocks: when the queue is full or the delivery task has
/// stopped, the event is logged and dropped.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotificationEvent>,
}

impl Notifier {
    /// Create a notifier and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Create a notifier backed by a detached delivery task.
    pub fn spawn(capacity: usize, sender: Arc<dyn NotificationSender>) -> (Self, JoinHandle<()>) {
        let (notifier, rx) = Self::channel(capacity);
        let handle = tokio::spawn(deliver(rx, sender));
        (notifier, handle)
    }

    pub fn notify(&self, event: NotificationEvent) {
        let kind = event.event_type.as_str();
        let user_id = event.user_id.clone();
        if self.tx.try_send(event).is_err() {
            warn!(%user_id, event = kind, "notification queue full or closed, event dropped");
        }
    }
}

/// Drain the queue until every `Notifier` is dropped, forwarding each event.
pub async fn deliver(
    mut rx: mpsc::Receiver<NotificationEvent>,
    sender: Arc<dyn NotificationSender>,
) {
    info!("notification delivery started");
    while let Some(event) = rx.recv().await {
        let kind = event.event_type.as_str();
        match sender.send_event(&event.user_id, kind, &event.payload).await {
            Ok(()) => debug!(user_id = %event.user_id, event = kind, "notification delivered"),
            Err(e) => warn!(user_id = %event.user_id, event = kind, error = %e, "notification failed"),
        }
    }
    info!("notification delivery stopped");
}
