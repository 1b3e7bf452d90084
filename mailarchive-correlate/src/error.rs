use mailarchive_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorrelationError {
    /// A configured pattern does not compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A configuration value is out of range.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    /// The correlation store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
