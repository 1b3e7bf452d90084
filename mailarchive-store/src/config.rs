use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::message::{FileMessageStore, MemoryMessageStore, MessageStore};

/// Where raw message bytes are kept
///
/// # Examples
///
/// File-backed store in RON config:
/// ```ron
/// Archive (
///     message_store: File(
///         path: "/var/lib/mailarchive/messages",
///     ),
/// )
/// ```
///
/// Memory-backed store with a capacity limit:
/// ```ron
/// Archive (
///     message_store: Memory(
///         capacity: 1000,
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum MessageStoreConfig {
    /// One file per message in a directory
    File { path: PathBuf },
    /// Messages kept in process memory
    Memory {
        /// Maximum number of messages to store (omit for unlimited)
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for MessageStoreConfig {
    fn default() -> Self {
        Self::File {
            path: FileMessageStore::default().path().to_path_buf(),
        }
    }
}

impl MessageStoreConfig {
    /// Get the directory of a file-backed store
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory { .. } => None,
        }
    }

    /// Initialise the configured backend and hand it out as a trait object
    ///
    /// # Errors
    /// Returns an error if the file store path is rejected or its directory
    /// cannot be prepared
    pub fn into_store(self) -> crate::Result<Arc<dyn MessageStore>> {
        match self {
            Self::File { path } => {
                let store = FileMessageStore::builder().path(path).build()?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory { capacity } => Ok(capacity.map_or_else(
                || Arc::new(MemoryMessageStore::new()) as Arc<dyn MessageStore>,
                |capacity| {
                    Arc::new(MemoryMessageStore::with_capacity(capacity)) as Arc<dyn MessageStore>
                },
            )),
        }
    }
}
