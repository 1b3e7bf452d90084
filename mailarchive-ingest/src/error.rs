use thiserror::Error;
use uuid::Uuid;

/// Reasons a submission was not archived.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The raw message could not be parsed; nothing was stored.
    #[error("Unable to parse message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    /// A freshly generated UUID was already in use.
    #[error("Message id collision: {0}")]
    DuplicateId(Uuid),

    /// Writing the message or its metadata failed.
    #[error("Store error: {0}")]
    Store(#[from] mailarchive_store::StoreError),
}

impl IngestError {
    /// Returns `true` if the submission itself was at fault.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}
