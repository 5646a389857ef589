//! Typed notifications emitted while folding events.

use weft_core::{Address, ChannelProperties, Event, EventHash, StreamId, StreamKind};

/// Something observable that happened in a stream.
///
/// Every variant names the stream it was emitted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The stream's inception event was folded.
    StreamInception { stream_id: StreamId, kind: StreamKind },

    // ─────────────────────────────────────────────────────────────────────────
    // User stream
    // ─────────────────────────────────────────────────────────────────────────
    UserInvitedToStream { stream_id: StreamId, target: StreamId },
    UserJoinedStream { stream_id: StreamId, target: StreamId },
    UserLeftStream { stream_id: StreamId, target: StreamId },

    // ─────────────────────────────────────────────────────────────────────────
    // Space and channel membership
    // ─────────────────────────────────────────────────────────────────────────
    StreamNewUserInvited { stream_id: StreamId, user: Address },
    StreamNewUserJoined { stream_id: StreamId, user: Address },
    StreamUserLeft { stream_id: StreamId, user: Address },

    // ─────────────────────────────────────────────────────────────────────────
    // Channel directory
    // ─────────────────────────────────────────────────────────────────────────
    SpaceNewChannelCreated {
        space_id: StreamId,
        channel_id: StreamId,
        properties: ChannelProperties,
    },
    SpaceChannelUpdated {
        space_id: StreamId,
        channel_id: StreamId,
        properties: ChannelProperties,
    },
    SpaceChannelDeleted { space_id: StreamId, channel_id: StreamId },

    ChannelNewMessage {
        stream_id: StreamId,
        hash: EventHash,
        creator: Address,
        text: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Batch trailers
    // ─────────────────────────────────────────────────────────────────────────
    /// The first batch of a stream was folded.
    StreamInitialized {
        stream_id: StreamId,
        kind: StreamKind,
        events: Vec<Event>,
    },
    /// A later batch was folded.
    StreamUpdated {
        stream_id: StreamId,
        kind: StreamKind,
        events: Vec<Event>,
    },
}

impl Notification {
    /// The stream this notification was emitted for.
    pub fn stream_id(&self) -> &StreamId {
        match self {
            Notification::StreamInception { stream_id, .. }
            | Notification::UserInvitedToStream { stream_id, .. }
            | Notification::UserJoinedStream { stream_id, .. }
            | Notification::UserLeftStream { stream_id, .. }
            | Notification::StreamNewUserInvited { stream_id, .. }
            | Notification::StreamNewUserJoined { stream_id, .. }
            | Notification::StreamUserLeft { stream_id, .. }
            | Notification::ChannelNewMessage { stream_id, .. }
            | Notification::StreamInitialized { stream_id, .. }
            | Notification::StreamUpdated { stream_id, .. } => stream_id,
            Notification::SpaceNewChannelCreated { space_id, .. }
            | Notification::SpaceChannelUpdated { space_id, .. }
            | Notification::SpaceChannelDeleted { space_id, .. } => space_id,
        }
    }
}
