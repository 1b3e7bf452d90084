//! Raw message storage.
//!
//! - `memory`: `HashMap` behind a lock, for tests and throwaway deployments
//! - `file`: one file per message in a directory

pub mod file;
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

pub use file::{FileMessageStore, FileMessageStoreBuilder};
pub use memory::MemoryMessageStore;

/// Immutable storage of raw message bytes
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Store the bytes of a new message.
    ///
    /// # Errors
    /// `StoreError::AlreadyExists` if something is already stored under `id`,
    /// or any backend failure.
    async fn put(&self, id: Uuid, data: &[u8]) -> crate::Result<()>;

    /// Fetch the bytes of a message.
    ///
    /// # Errors
    /// `StoreError::NotFound` if nothing is stored under `id`.
    async fn get(&self, id: Uuid) -> crate::Result<Vec<u8>>;

    /// Remove a message. Removing a missing message is not an error.
    ///
    /// # Errors
    /// Backend failures only.
    async fn delete(&self, id: Uuid) -> crate::Result<()>;

    /// # Errors
    /// Backend failures only.
    async fn contains(&self, id: Uuid) -> crate::Result<bool>;

    /// IDs of every stored message, in no particular order
    ///
    /// # Errors
    /// Backend failures only.
    async fn list(&self) -> crate::Result<Vec<Uuid>>;
}
