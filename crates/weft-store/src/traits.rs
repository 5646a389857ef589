//! Store trait: the abstract interface for event log persistence.
//!
//! Events are keyed by `(stream_id, hash)` and kept in append order, so a
//! stream position is simply the number of events stored before it.

use async_trait::async_trait;
use weft_core::{Event, EventHash, StreamId};

use crate::error::Result;

/// Result of appending an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Event was appended.
    Inserted,
    /// Event already exists in this stream (idempotent, not an error).
    AlreadyExists,
}

/// The EventStore trait: async interface for event persistence.
///
/// # Design Notes
///
/// - **Append-only**: events are never rewritten or removed.
/// - **Idempotent appends**: appending a known event returns `AlreadyExists`.
/// - **Positions**: `events_since(stream, n)` returns everything appended after
///   the first `n` events, in append order.
#[async_trait]
pub trait EventStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Stream Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a stream from its initial events.
    async fn create_stream(&self, stream_id: &StreamId, events: &[Event]) -> Result<()>;

    /// All events of a stream in append order.
    async fn get_stream(&self, stream_id: &StreamId) -> Result<Option<Vec<Event>>>;

    /// Number of events in a stream.
    async fn stream_len(&self, stream_id: &StreamId) -> Result<Option<u64>>;

    /// List all stream ids.
    async fn list_streams(&self) -> Result<Vec<StreamId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Event Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an event to an existing stream.
    async fn append_event(&self, stream_id: &StreamId, event: &Event) -> Result<InsertResult>;

    /// Get an event by stream and hash.
    async fn get_event(&self, stream_id: &StreamId, hash: &EventHash) -> Result<Option<Event>>;

    /// Check if a stream holds an event.
    async fn has_event(&self, stream_id: &StreamId, hash: &EventHash) -> Result<bool>;

    /// Events appended after the first `position` events.
    async fn events_since(&self, stream_id: &StreamId, position: u64) -> Result<Vec<Event>>;
}
