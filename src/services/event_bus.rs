use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::notification::Notification;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    Created(Notification),
    TaskChanged { task_id: u64, status: String },
}

#[derive(Debug, Clone)]
pub struct RecipientEvent {
    pub recipient_id: u64,
    pub event: NotificationEvent,
}

/// In-process fan-out of notification events to open SSE streams.
pub struct EventBus {
    tx: broadcast::Sender<RecipientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, recipient_id: u64, event: NotificationEvent) {
        // no open streams is the common case
        if self.tx.send(RecipientEvent { recipient_id, event }).is_err() {
            debug!(recipient_id, "No subscribers for notification event");
        }
    }

    pub fn publish_all(&self, notifications: Vec<Notification>) {
        for n in notifications {
            self.publish(n.recipient_id, NotificationEvent::Created(n));
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecipientEvent> {
        self.tx.subscribe()
    }
}
