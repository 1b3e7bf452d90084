use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{StoreError, message::MessageStore};

/// In-memory message store.
///
/// Messages live in a `HashMap` behind an `RwLock` and vanish with the
/// process. An optional capacity makes writes fail once that many messages
/// are stored.
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    messages: Arc<RwLock<HashMap<Uuid, Arc<[u8]>>>>,
    /// Maximum number of messages to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Arc::default(),
            capacity: Some(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn put(&self, id: Uuid, data: &[u8]) -> crate::Result<()> {
        let mut messages = self.messages.write();

        if messages.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }

        if let Some(cap) = self.capacity
            && messages.len() >= cap
        {
            return Err(StoreError::Internal(format!(
                "Memory store capacity exceeded: {}/{cap} messages",
                messages.len()
            )));
        }

        messages.insert(id, Arc::from(data));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> crate::Result<Vec<u8>> {
        self.messages
            .read()
            .get(&id)
            .map(|data| data.to_vec())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: Uuid) -> crate::Result<()> {
        self.messages.write().remove(&id);
        Ok(())
    }

    async fn contains(&self, id: Uuid) -> crate::Result<bool> {
        Ok(self.messages.read().contains_key(&id))
    }

    async fn list(&self) -> crate::Result<Vec<Uuid>> {
        Ok(self.messages.read().keys().copied().collect())
    }
}
