//! Events pushed to subscribers (the UI push channel lives elsewhere).

use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::Message;

/// Named event, serialised as `{"event": "<name>", "data": …}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    ReceivedNewMessage(Box<Message>),
    UpdateMessageCount(u64),
    MessageStatusesUpdated,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReceivedNewMessage(_) => "receivedNewMessage",
            Self::UpdateMessageCount(_) => "updateMessageCount",
            Self::MessageStatusesUpdated => "messageStatusesUpdated",
        }
    }
}

/// Where events go. Publishing is best effort and must not block.
pub trait NotificationSink: Send + Sync + std::fmt::Debug {
    fn publish(&self, event: Event);
}

/// Fan-out sink backed by a tokio broadcast channel.
///
/// Slow subscribers lag and lose events, publishing without subscribers is a
/// no-op.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Event>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(64)
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, event: Event) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for {name}");
        }
    }
}
