//! Request and response types of the stream RPC surface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use weft_core::{Event, StreamId};

use crate::error::{Result, SyncError};

/// Request size limits enforced by nodes.
pub mod limits {
    /// Max positions in one `SyncStreamsRequest`.
    pub const MAX_SYNC_POSITIONS: usize = 1000;
    /// Max events in a create request.
    pub const MAX_CREATE_EVENTS: usize = 16;
}

/// Opaque continuation token for one stream.
///
/// Only the node that issued a cookie interprets it. Clients store the cookie
/// they last received and echo it back on the next sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncCookie {
    stream_id: StreamId,
    position: u64,
}

impl SyncCookie {
    pub fn new(stream_id: StreamId, position: u64) -> Self {
        Self {
            stream_id,
            position,
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Number of stream events the holder has seen.
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// A sync position: where a client stands in one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPos {
    pub stream_id: StreamId,
    pub sync_cookie: SyncCookie,
}

/// A stream slice returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAndCookie {
    pub stream_id: StreamId,
    /// Events after `original_sync_cookie`, or the whole stream.
    pub events: Vec<Event>,
    /// Cookie to send next time.
    pub sync_cookie: SyncCookie,
    /// The cookie this slice continues from. `None` for full stream loads.
    pub original_sync_cookie: Option<SyncCookie>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStreamRequest {
    pub stream_id: StreamId,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetEventStreamRequest {
    pub stream_id: StreamId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEventRequest {
    pub stream_id: StreamId,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStreamsRequest {
    pub positions: Vec<SyncPos>,
    /// How long the node may hold the call open waiting for new events.
    pub timeout: Duration,
}

impl SyncStreamsRequest {
    /// Check this request against [`limits`] and cookie consistency.
    pub fn validate(&self) -> Result<()> {
        if self.positions.len() > limits::MAX_SYNC_POSITIONS {
            return Err(SyncError::InvalidRequest(format!(
                "too many sync positions: {}",
                self.positions.len()
            )));
        }
        for pos in &self.positions {
            if pos.sync_cookie.stream_id() != &pos.stream_id {
                return Err(SyncError::InvalidRequest(format!(
                    "cookie for {} used for {}",
                    pos.sync_cookie.stream_id(),
                    pos.stream_id
                )));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResponse {
    pub stream: StreamAndCookie,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStreamsResponse {
    /// Streams with new events, keyed by id.
    pub streams: BTreeMap<StreamId, StreamAndCookie>,
}
