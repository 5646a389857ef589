//! Error types for the store module.

use thiserror::Error;
use weft_core::StreamId;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A stream with this id is already stored.
    #[error("stream already exists: {0}")]
    StreamExists(StreamId),

    /// The stream is not stored.
    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Invalid data handed to the store.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
