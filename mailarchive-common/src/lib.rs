//! Shared types for the mail archive.
//!
//! Everything that more than one component needs to agree on lives here: the
//! archived [`Message`](model::Message) and its correlation trail, the events
//! pushed to subscribers, the live message counter and the logging setup.

pub mod counter;
pub mod logging;
pub mod model;
pub mod notify;

pub use counter::MessageCounter;
pub use model::{DeliveryLogLine, Message, MessageStatus, QueueKey, QueueRecord, SyslogLine};
pub use notify::{BroadcastSink, Event, NotificationSink};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
