//! Event: the atomic unit of a stream.
//!
//! An event is immutable and signed. Its hash covers the whole body: creator,
//! salt, timestamp, predecessors, delegation and payload. The random salt makes
//! every authored event unique, so retrying a send never collides with an
//! earlier copy of the same content.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canonical::canonical_body_bytes;
use crate::crypto::{hash_event_body, Signature};
use crate::error::ValidationError;
use crate::signer::{DelegateSig, SignerContext};
use crate::stream::{StreamId, StreamKind};
use crate::types::{Address, EventHash};

/// Length of the per-event random salt.
pub const SALT_LEN: usize = 16;

/// Membership transitions. Unknown wire values are kept, not discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipOp {
    Unspecified,
    Invite,
    Join,
    Leave,
    Unrecognized(u32),
}

impl MembershipOp {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::Invite => 1,
            Self::Join => 2,
            Self::Leave => 3,
            Self::Unrecognized(v) => v,
        }
    }

    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Unspecified,
            1 => Self::Invite,
            2 => Self::Join,
            3 => Self::Leave,
            v => Self::Unrecognized(v),
        }
    }
}

/// Channel directory operations recorded in a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelOp {
    Unspecified,
    Created,
    Deleted,
    Updated,
    Unrecognized(u32),
}

impl ChannelOp {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::Created => 1,
            Self::Deleted => 2,
            Self::Updated => 3,
            Self::Unrecognized(v) => v,
        }
    }

    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Unspecified,
            1 => Self::Created,
            2 => Self::Deleted,
            3 => Self::Updated,
            v => Self::Unrecognized(v),
        }
    }
}

/// Display metadata for a space or channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelProperties {
    pub name: String,
    pub topic: String,
}

/// The first event of every stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inception {
    pub stream_id: StreamId,
    pub kind: StreamKind,
    /// Parent space, required for channels.
    pub space_id: Option<StreamId>,
    /// Display metadata of a space or channel.
    pub properties: Option<ChannelProperties>,
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Stream creation.
    Inception(Inception),
    /// Recorded in a user stream: the user was invited to, joined or left `stream_id`.
    UserMembership { op: MembershipOp, stream_id: StreamId },
    /// Recorded in a space or channel: `user` was invited, joined or left.
    Membership { op: MembershipOp, user: Address },
    /// Recorded in a space: the channel directory changed.
    Channel {
        op: ChannelOp,
        channel_id: StreamId,
        properties: Option<ChannelProperties>,
    },
    /// Recorded in a channel.
    Message { text: String },
    /// A payload kind this version does not know.
    Unrecognized { kind: u32 },
}

impl Payload {
    /// Wire tag of the payload kind.
    pub fn kind_tag(&self) -> u32 {
        match self {
            Payload::Inception(_) => 1,
            Payload::UserMembership { .. } => 2,
            Payload::Membership { .. } => 3,
            Payload::Channel { .. } => 4,
            Payload::Message { .. } => 5,
            Payload::Unrecognized { kind } => *kind,
        }
    }

    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Inception(_) => "inception",
            Payload::UserMembership { .. } => "user_membership",
            Payload::Membership { .. } => "membership",
            Payload::Channel { .. } => "channel",
            Payload::Message { .. } => "message",
            Payload::Unrecognized { .. } => "unrecognized",
        }
    }

    /// Whether this payload may appear in a stream of the given kind.
    ///
    /// Inceptions are checked separately against the stream id.
    pub fn allowed_in(&self, kind: StreamKind) -> bool {
        match self {
            Payload::Inception(inception) => inception.kind == kind,
            Payload::UserMembership { .. } => kind == StreamKind::User,
            Payload::Membership { .. } => kind.is_joinable(),
            Payload::Channel { .. } => kind == StreamKind::Space,
            Payload::Message { .. } => kind == StreamKind::Channel,
            Payload::Unrecognized { .. } => false,
        }
    }
}

/// The signed content of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBody {
    /// The address the event is attributed to.
    pub creator_address: Address,
    /// Random bytes that make each authored event unique.
    pub salt: [u8; SALT_LEN],
    /// Causal parents. Empty only for inception.
    pub prev_events: Vec<EventHash>,
    /// Author-claimed creation time (epoch milliseconds).
    pub created_at_ms: i64,
    /// Present when a delegate key signed on the creator's behalf.
    pub delegate_sig: Option<DelegateSig>,
    pub payload: Payload,
}

/// A complete event: body, its hash, and a signature over the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub hash: EventHash,
    pub signature: Signature,
    pub body: EventBody,
}

impl Event {
    /// Recompute the hash from the body.
    pub fn compute_hash(&self) -> EventHash {
        hash_event_body(&canonical_body_bytes(&self.body))
    }

    pub fn creator(&self) -> Address {
        self.body.creator_address
    }

    pub fn prev_events(&self) -> &[EventHash] {
        &self.body.prev_events
    }

    pub fn payload(&self) -> &Payload {
        &self.body.payload
    }

    pub fn created_at_ms(&self) -> i64 {
        self.body.created_at_ms
    }

    /// The inception payload, if this is an inception event.
    pub fn inception(&self) -> Option<&Inception> {
        match &self.body.payload {
            Payload::Inception(inception) => Some(inception),
            _ => None,
        }
    }

    pub fn is_inception(&self) -> bool {
        self.inception().is_some()
    }
}

/// Builder for creating events.
pub struct EventBuilder {
    payload: Payload,
    prev_events: Vec<Vec<u8>>,
    created_at_ms: Option<i64>,
    salt: Option<[u8; SALT_LEN]>,
}

impl EventBuilder {
    /// Start building an event with the given payload.
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            prev_events: Vec::new(),
            created_at_ms: None,
            salt: None,
        }
    }

    /// Set the predecessors, normally the stream's current leaf frontier.
    ///
    /// Raw byte strings are accepted; length is checked when signing.
    pub fn prev_events<I, B>(mut self, prevs: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        self.prev_events = prevs.into_iter().map(|p| p.as_ref().to_vec()).collect();
        self
    }

    /// Set the creation time. Defaults to now.
    pub fn created_at(mut self, ms: i64) -> Self {
        self.created_at_ms = Some(ms);
        self
    }

    /// Set the salt. Defaults to random bytes.
    pub fn salt(mut self, salt: [u8; SALT_LEN]) -> Self {
        self.salt = Some(salt);
        self
    }

    /// Build, hash and sign the event.
    ///
    /// Fails with `StreamBadHashes` if any predecessor is not a 32-byte hash
    /// or is listed twice.
    pub fn sign(self, signer: &SignerContext) -> Result<Event, ValidationError> {
        let mut prev_events = Vec::with_capacity(self.prev_events.len());
        let mut seen = BTreeSet::new();
        for raw in &self.prev_events {
            let hash = EventHash::from_slice(raw)?;
            if !seen.insert(hash) {
                return Err(ValidationError::StreamBadHashes(format!(
                    "duplicate prev event {hash}"
                )));
            }
            prev_events.push(hash);
        }

        let body = EventBody {
            creator_address: signer.creator_address(),
            salt: self.salt.unwrap_or_else(|| rand::thread_rng().gen()),
            prev_events,
            created_at_ms: self.created_at_ms.unwrap_or_else(now_millis),
            delegate_sig: signer.delegate_sig().copied(),
            payload: self.payload,
        };

        let hash = hash_event_body(&canonical_body_bytes(&body));
        let signature = signer.sign(hash.as_bytes())?;

        Ok(Event {
            hash,
            signature,
            body,
        })
    }
}

/// Build and sign an event whose predecessors are `prev_events`.
pub fn make_event<B: AsRef<[u8]>>(
    signer: &SignerContext,
    payload: Payload,
    prev_events: &[B],
) -> Result<Event, ValidationError> {
    EventBuilder::new(payload).prev_events(prev_events).sign(signer)
}

/// Get current time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
