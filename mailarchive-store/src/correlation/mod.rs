//! Message metadata and the delivery trail that hangs off it.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailarchive_common::{DeliveryLogLine, Message, MessageStatus, QueueKey, QueueRecord};
use uuid::Uuid;

pub use memory::MemoryCorrelationStore;

/// Tables for messages, queue-ID correlation records and delivery log lines
///
/// Lookups that find nothing return `Ok(None)` or an empty list.
#[async_trait]
pub trait CorrelationStore: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// `StoreError::AlreadyExists` if the UUID is taken, or backend failures.
    async fn insert_message(&self, message: &Message) -> crate::Result<()>;

    /// # Errors
    /// Backend failures only.
    async fn message(&self, uuid: Uuid) -> crate::Result<Option<Message>>;

    /// Every archived message carrying this `Message-ID`
    ///
    /// # Errors
    /// Backend failures only.
    async fn messages_by_message_id(&self, message_id: &str) -> crate::Result<Vec<Message>>;

    /// Messages received at or before `cutoff`, oldest first
    ///
    /// # Errors
    /// Backend failures only.
    async fn messages_received_before(&self, cutoff: DateTime<Utc>)
    -> crate::Result<Vec<Message>>;

    /// # Errors
    /// `StoreError::NotFound` if there is no such message.
    async fn set_message_status(&self, uuid: Uuid, status: MessageStatus) -> crate::Result<()>;

    /// Deleting a missing message is not an error.
    ///
    /// # Errors
    /// Backend failures only.
    async fn delete_message(&self, uuid: Uuid) -> crate::Result<()>;

    /// # Errors
    /// Backend failures only.
    async fn message_count(&self) -> crate::Result<u64>;

    /// Create or overwrite the record for its `(hostname, queue_id)`
    ///
    /// # Errors
    /// Backend failures only.
    async fn save_queue_record(&self, record: &QueueRecord) -> crate::Result<()>;

    /// # Errors
    /// Backend failures only.
    async fn queue_record(&self, key: &QueueKey) -> crate::Result<Option<QueueRecord>>;

    /// # Errors
    /// Backend failures only.
    async fn queue_records_by_message_id(&self, message_id: &str)
    -> crate::Result<Vec<QueueRecord>>;

    /// # Errors
    /// Backend failures only.
    async fn delete_queue_record(&self, key: &QueueKey) -> crate::Result<()>;

    /// # Errors
    /// Backend failures only.
    async fn append_log_line(&self, line: &DeliveryLogLine) -> crate::Result<()>;

    /// Lines attributed to a queue ID, in the order they were appended
    ///
    /// # Errors
    /// Backend failures only.
    async fn log_lines(&self, key: &QueueKey) -> crate::Result<Vec<DeliveryLogLine>>;

    /// Returns how many lines were removed
    ///
    /// # Errors
    /// Backend failures only.
    async fn delete_log_lines(&self, key: &QueueKey) -> crate::Result<usize>;
}
