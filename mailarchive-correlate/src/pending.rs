use std::{collections::HashSet, sync::Arc};

use mailarchive_common::QueueKey;
use parking_lot::Mutex;

/// Queue IDs whose status changed since the last reconciliation.
///
/// The engine marks, the reconciler takes. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct PendingUpdates {
    keys: Arc<Mutex<HashSet<QueueKey>>>,
}

impl PendingUpdates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key was not already pending.
    pub fn mark(&self, key: QueueKey) -> bool {
        self.keys.lock().insert(key)
    }

    /// Empty the set, returning what was in it
    #[must_use]
    pub fn take(&self) -> HashSet<QueueKey> {
        std::mem::take(&mut *self.keys.lock())
    }

    #[must_use]
    pub fn contains(&self, key: &QueueKey) -> bool {
        self.keys.lock().contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}
