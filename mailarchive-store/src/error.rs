//! Error types for the storage layer.

use std::io;

use thiserror::Error;

/// Top-level store error type.
///
/// Lookups that simply find nothing are not errors; they come back as `None`
/// or an empty list. `NotFound` is reserved for operations that need the key
/// to exist.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key an operation required does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A write would overwrite immutable content.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Store directory or configuration validation failed.
    #[error("Store validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store refused the write (capacity, poisoned state, ...).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Message store directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Store path cannot contain '..' components: {0}")]
    ParentDirectory(String),

    #[error("Store path must be absolute: {0}")]
    NotAbsolute(String),

    #[error("Store path cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: String, path: String },

    #[error("Store path is not a directory: {0}")]
    NotDirectory(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
