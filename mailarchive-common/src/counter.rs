use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Number of messages currently archived.
///
/// Ingestion increments it, the retention sweeper decrements it and the query
/// side reads it. Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct MessageCounter {
    count: Arc<AtomicU64>,
}

impl MessageCounter {
    #[must_use]
    pub fn new(initial: u64) -> Self {
        Self {
            count: Arc::new(AtomicU64::new(initial)),
        }
    }

    /// Add one message, returning the new count
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Remove one message, returning the new count. Never goes below zero.
    pub fn decrement(&self) -> u64 {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or_else(|n| n);

        previous.saturating_sub(1)
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}
