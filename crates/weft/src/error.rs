//! Error types for the client.

use thiserror::Error;
use weft_core::{StreamId, ValidationError};
use weft_sync::{SyncCookie, SyncError};

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// RPC error.
    #[error("rpc error: {0}")]
    Rpc(#[from] SyncError),

    /// A sync slice does not continue from the cookie we hold.
    #[error("sync cookie mismatch for {stream_id}: expected {expected:?}, got {got:?}")]
    SyncCookieMismatch {
        stream_id: StreamId,
        expected: Option<SyncCookie>,
        got: Option<SyncCookie>,
    },

    #[error("sync already started")]
    SyncAlreadyStarted,

    #[error("sync not started")]
    SyncNotStarted,

    #[error("user stream not initialized")]
    UserStreamNotInitialized,

    /// Stream not loaded in this client.
    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),

    #[error("timed out")]
    Timeout,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
