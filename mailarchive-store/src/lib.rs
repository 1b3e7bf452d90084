//! Storage for the mail archive.
//!
//! Two stores with different shapes:
//! - [`MessageStore`]: immutable raw message bytes keyed by UUID
//! - [`CorrelationStore`]: message metadata, queue-ID correlation records and
//!   the delivery log lines attributed to them

pub mod config;
pub mod correlation;
pub mod error;
pub mod message;

pub use config::MessageStoreConfig;
pub use correlation::{CorrelationStore, MemoryCorrelationStore};
pub use error::{Result, StoreError, ValidationError};
pub use message::{FileMessageStore, FileMessageStoreBuilder, MemoryMessageStore, MessageStore};
