//! Turns an accepted SMTP transmission into an archived message.

mod error;
mod headers;
mod pipeline;

pub use error::IngestError;
pub use headers::{HeaderSummary, summarise};
pub use pipeline::{IngestConfig, Ingestor, Submission};
