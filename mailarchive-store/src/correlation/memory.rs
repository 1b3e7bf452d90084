use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use mailarchive_common::{DeliveryLogLine, Message, MessageStatus, QueueKey, QueueRecord};
use uuid::Uuid;

use crate::{StoreError, correlation::CorrelationStore};

/// In-memory correlation store.
///
/// Each table is a `DashMap`; log lines are grouped per queue key so that
/// deleting a queue ID's trail is a single removal. Clones share the tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorrelationStore {
    messages: Arc<DashMap<Uuid, Message>>,
    queue_records: Arc<DashMap<QueueKey, QueueRecord>>,
    log_lines: Arc<DashMap<QueueKey, Vec<DeliveryLogLine>>>,
}

impl MemoryCorrelationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored log lines, across all queue IDs
    #[must_use]
    pub fn log_line_count(&self) -> usize {
        self.log_lines.iter().map(|entry| entry.value().len()).sum()
    }

    #[must_use]
    pub fn queue_record_count(&self) -> usize {
        self.queue_records.len()
    }
}

#[async_trait]
impl CorrelationStore for MemoryCorrelationStore {
    async fn insert_message(&self, message: &Message) -> crate::Result<()> {
        match self.messages.entry(message.uuid) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(message.uuid.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
                Ok(())
            }
        }
    }

    async fn message(&self, uuid: Uuid) -> crate::Result<Option<Message>> {
        Ok(self.messages.get(&uuid).map(|entry| entry.value().clone()))
    }

    async fn messages_by_message_id(&self, message_id: &str) -> crate::Result<Vec<Message>> {
        Ok(self
            .messages
            .iter()
            .filter(|entry| entry.value().message_id == message_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn messages_received_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> crate::Result<Vec<Message>> {
        let mut expired: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| entry.value().received_at <= cutoff)
            .map(|entry| entry.value().clone())
            .collect();

        expired.sort_by_key(|message| message.received_at);

        Ok(expired)
    }

    async fn set_message_status(&self, uuid: Uuid, status: MessageStatus) -> crate::Result<()> {
        let mut entry = self
            .messages
            .get_mut(&uuid)
            .ok_or_else(|| StoreError::NotFound(uuid.to_string()))?;
        entry.value_mut().status = status;
        Ok(())
    }

    async fn delete_message(&self, uuid: Uuid) -> crate::Result<()> {
        self.messages.remove(&uuid);
        Ok(())
    }

    async fn message_count(&self) -> crate::Result<u64> {
        Ok(u64::try_from(self.messages.len()).unwrap_or(u64::MAX))
    }

    async fn save_queue_record(&self, record: &QueueRecord) -> crate::Result<()> {
        self.queue_records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn queue_record(&self, key: &QueueKey) -> crate::Result<Option<QueueRecord>> {
        Ok(self.queue_records.get(key).map(|entry| entry.value().clone()))
    }

    async fn queue_records_by_message_id(
        &self,
        message_id: &str,
    ) -> crate::Result<Vec<QueueRecord>> {
        Ok(self
            .queue_records
            .iter()
            .filter(|entry| entry.value().message_id == message_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn delete_queue_record(&self, key: &QueueKey) -> crate::Result<()> {
        self.queue_records.remove(key);
        Ok(())
    }

    async fn append_log_line(&self, line: &DeliveryLogLine) -> crate::Result<()> {
        self.log_lines
            .entry(line.key())
            .or_default()
            .push(line.clone());
        Ok(())
    }

    async fn log_lines(&self, key: &QueueKey) -> crate::Result<Vec<DeliveryLogLine>> {
        Ok(self
            .log_lines
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn delete_log_lines(&self, key: &QueueKey) -> crate::Result<usize> {
        Ok(self
            .log_lines
            .remove(key)
            .map_or(0, |(_, lines)| lines.len()))
    }
}
