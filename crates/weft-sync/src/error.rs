//! Error types for the sync module.

use thiserror::Error;

use weft_core::StreamId;

/// Errors returned by the stream RPC surface.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The stream is not hosted by the node.
    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),

    /// A stream with this id already exists.
    #[error("stream already exists: {0}")]
    StreamExists(StreamId),

    /// The events of a create request do not form a valid new stream.
    #[error("bad stream creation: {0}")]
    BadStreamCreation(String),

    /// The creator may not append this event.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Join by a user who is already a member.
    #[error("{user} is already a member of {stream_id}")]
    AlreadyMember { stream_id: StreamId, user: String },

    /// Leave by a user who is not a member.
    #[error("{user} is not a member of {stream_id}")]
    NotMember { stream_id: StreamId, user: String },

    /// Malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Event validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] weft_core::ValidationError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] weft_store::StoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
