//! Error types for weft core.

use thiserror::Error;

/// Errors raised by key handling and encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("encoding error: {0}")]
    EncodingError(String),
}

/// Validation errors for event structure, stream shape and authorship.
///
/// `StreamEmpty`, `StreamBadEvent` and `StreamBadHashes` are fatal to the
/// stream or batch being built. Integrity and authorship variants reject only
/// the event that carries them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("stream is empty: {0}")]
    StreamEmpty(String),

    #[error("bad event: {0}")]
    StreamBadEvent(String),

    #[error("bad hashes: {0}")]
    StreamBadHashes(String),

    #[error("event hash does not match its content")]
    HashMismatch,

    #[error("event signature is not valid for its creator")]
    InvalidSignature,

    #[error("delegate signature expired at {expiry_ms} (now {now_ms})")]
    DelegateSigExpired { expiry_ms: i64, now_ms: i64 },

    #[error("delegate signature does not bind the creator")]
    DelegateSigMismatch,
}

impl ValidationError {
    /// Whether this is an authorship error, which rejects a single event
    /// rather than its batch.
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            ValidationError::InvalidSignature
                | ValidationError::DelegateSigExpired { .. }
                | ValidationError::DelegateSigMismatch
        )
    }
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidPublicKey | CoreError::RecoveryFailed => {
                ValidationError::InvalidSignature
            }
            other => ValidationError::StreamBadEvent(other.to_string()),
        }
    }
}
