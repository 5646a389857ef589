//! Stream state computation.
//!
//! A [`StreamStateView`] is built by folding a stream's events in arrival
//! order. It keeps every event by hash, the leaf frontier, and the derived
//! sets each payload kind maintains. Batches are checked before anything is
//! mutated, so a rejected batch leaves the view exactly as it was.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;
use weft_core::{
    Address, ChannelOp, ChannelProperties, Event, EventHash, Inception, LeafFrontier,
    MembershipOp, Payload, StreamId, StreamKind, ValidationError,
};

use crate::notification::Notification;
use crate::Result;

/// A message recorded in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub hash: EventHash,
    pub creator: Address,
    pub text: String,
    pub created_at_ms: i64,
}

/// Materialized state of one stream.
#[derive(Debug, Clone)]
pub struct StreamStateView {
    stream_id: StreamId,
    kind: StreamKind,
    parent_space_id: Option<StreamId>,
    properties: Option<ChannelProperties>,
    inception_hash: EventHash,

    /// All folded events indexed by hash.
    events: HashMap<EventHash, Event>,

    /// Hashes in fold order.
    timeline: Vec<EventHash>,

    leaves: LeafFrontier,
    initialized: bool,

    joined_users: BTreeSet<Address>,
    invited_users: BTreeSet<Address>,
    space_channels: BTreeMap<StreamId, ChannelProperties>,
    user_joined_streams: BTreeSet<StreamId>,
    user_invited_streams: BTreeSet<StreamId>,
    messages: BTreeMap<EventHash, ChannelMessage>,
}

impl StreamStateView {
    /// Create an empty view for `stream_id` from its first event.
    ///
    /// The first event must be an inception declaring this stream's id and
    /// the kind its prefix names. Nothing is folded yet: the inception is
    /// expected at the head of the first batch passed to [`add_events`].
    ///
    /// [`add_events`]: StreamStateView::add_events
    pub fn new(stream_id: &StreamId, first: Option<&Event>) -> Result<Self> {
        let first = first.ok_or_else(|| ValidationError::StreamEmpty(stream_id.to_string()))?;

        let inception = first.inception().ok_or_else(|| {
            ValidationError::StreamBadEvent(format!(
                "first event of {stream_id} is {}, not inception",
                first.payload().name()
            ))
        })?;

        check_inception(stream_id, inception)?;

        Ok(Self {
            stream_id: stream_id.clone(),
            kind: inception.kind,
            parent_space_id: inception.space_id.clone(),
            properties: inception.properties.clone(),
            inception_hash: first.hash,
            events: HashMap::new(),
            timeline: Vec::new(),
            leaves: LeafFrontier::new(),
            initialized: false,
            joined_users: BTreeSet::new(),
            invited_users: BTreeSet::new(),
            space_channels: BTreeMap::new(),
            user_joined_streams: BTreeSet::new(),
            user_invited_streams: BTreeSet::new(),
            messages: BTreeMap::new(),
        })
    }

    /// Fold a batch of events in order.
    ///
    /// The whole batch is rejected, with no change to the view, if any event
    /// is a duplicate, names an unknown predecessor, is a second inception,
    /// does not belong to this stream's kind, or carries an unrecognized op.
    ///
    /// On success the returned notifications end with exactly one
    /// `StreamInitialized` (first batch) or `StreamUpdated` trailer.
    pub fn add_events(&mut self, events: &[Event]) -> Result<Vec<Notification>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        self.check_batch(events)?;

        let mut notifications = Vec::with_capacity(events.len() + 1);
        for event in events {
            self.commit(event, &mut notifications);
        }

        let trailer = if self.initialized {
            Notification::StreamUpdated {
                stream_id: self.stream_id.clone(),
                kind: self.kind,
                events: events.to_vec(),
            }
        } else {
            self.initialized = true;
            Notification::StreamInitialized {
                stream_id: self.stream_id.clone(),
                kind: self.kind,
                events: events.to_vec(),
            }
        };
        notifications.push(trailer);

        debug!(
            stream_id = %self.stream_id,
            events = events.len(),
            leaves = self.leaves.len(),
            "folded batch"
        );
        Ok(notifications)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batch checks
    // ─────────────────────────────────────────────────────────────────────────

    fn check_batch(&self, events: &[Event]) -> Result<()> {
        let mut pending: HashSet<EventHash> = HashSet::with_capacity(events.len());

        for (index, event) in events.iter().enumerate() {
            let known = |hash: &EventHash| self.events.contains_key(hash) || pending.contains(hash);

            if known(&event.hash) {
                return Err(ValidationError::StreamBadEvent(format!(
                    "duplicate event {} in {}",
                    event.hash, self.stream_id
                )));
            }

            let expects_inception = self.events.is_empty() && index == 0;
            if event.is_inception() {
                if !expects_inception || event.hash != self.inception_hash {
                    return Err(ValidationError::StreamBadEvent(format!(
                        "second inception {} in {}",
                        event.hash, self.stream_id
                    )));
                }
            } else if expects_inception {
                return Err(ValidationError::StreamBadEvent(format!(
                    "{} must start with its inception",
                    self.stream_id
                )));
            } else {
                if event.prev_events().is_empty() {
                    return Err(ValidationError::StreamBadHashes(format!(
                        "event {} has no prev events",
                        event.hash
                    )));
                }
                if let Some(missing) = event.prev_events().iter().find(|h| !known(h)) {
                    return Err(ValidationError::StreamBadEvent(format!(
                        "event {} references unknown prev {missing}",
                        event.hash
                    )));
                }
                self.check_payload(event)?;
            }

            pending.insert(event.hash);
        }

        Ok(())
    }

    fn check_payload(&self, event: &Event) -> Result<()> {
        let payload = event.payload();
        if !payload.allowed_in(self.kind) {
            return Err(ValidationError::StreamBadEvent(format!(
                "{} payload not allowed in {} stream {}",
                payload.name(),
                self.kind,
                self.stream_id
            )));
        }

        let unrecognized = match payload {
            Payload::UserMembership { op, .. } | Payload::Membership { op, .. } => {
                matches!(op, MembershipOp::Unrecognized(_))
            }
            Payload::Channel { op, .. } => {
                matches!(op, ChannelOp::Unspecified | ChannelOp::Unrecognized(_))
            }
            _ => false,
        };
        if unrecognized {
            return Err(ValidationError::StreamBadEvent(format!(
                "unrecognized {} op in event {}",
                payload.name(),
                event.hash
            )));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fold
    // ─────────────────────────────────────────────────────────────────────────

    fn commit(&mut self, event: &Event, out: &mut Vec<Notification>) {
        self.events.insert(event.hash, event.clone());
        self.timeline.push(event.hash);
        self.leaves.fold(event);

        let stream_id = self.stream_id.clone();
        match event.payload() {
            Payload::Inception(inception) => out.push(Notification::StreamInception {
                stream_id,
                kind: inception.kind,
            }),
            Payload::UserMembership { op, stream_id: target } => {
                let target = target.clone();
                match op {
                    MembershipOp::Invite => {
                        self.user_invited_streams.insert(target.clone());
                        out.push(Notification::UserInvitedToStream { stream_id, target });
                    }
                    MembershipOp::Join => {
                        self.user_joined_streams.insert(target.clone());
                        out.push(Notification::UserJoinedStream { stream_id, target });
                    }
                    MembershipOp::Leave => {
                        self.user_joined_streams.remove(&target);
                        out.push(Notification::UserLeftStream { stream_id, target });
                    }
                    MembershipOp::Unspecified | MembershipOp::Unrecognized(_) => {}
                }
            }
            Payload::Membership { op, user } => {
                let user = *user;
                match op {
                    MembershipOp::Invite => {
                        self.invited_users.insert(user);
                        out.push(Notification::StreamNewUserInvited { stream_id, user });
                    }
                    MembershipOp::Join => {
                        self.joined_users.insert(user);
                        out.push(Notification::StreamNewUserJoined { stream_id, user });
                    }
                    MembershipOp::Leave => {
                        self.joined_users.remove(&user);
                        self.invited_users.remove(&user);
                        out.push(Notification::StreamUserLeft { stream_id, user });
                    }
                    MembershipOp::Unspecified | MembershipOp::Unrecognized(_) => {}
                }
            }
            Payload::Channel {
                op,
                channel_id,
                properties,
            } => {
                let channel_id = channel_id.clone();
                let properties = properties.clone().unwrap_or_default();
                match op {
                    ChannelOp::Created => {
                        self.space_channels.insert(channel_id.clone(), properties.clone());
                        out.push(Notification::SpaceNewChannelCreated {
                            space_id: stream_id,
                            channel_id,
                            properties,
                        });
                    }
                    ChannelOp::Updated => {
                        self.space_channels.insert(channel_id.clone(), properties.clone());
                        out.push(Notification::SpaceChannelUpdated {
                            space_id: stream_id,
                            channel_id,
                            properties,
                        });
                    }
                    ChannelOp::Deleted => {
                        self.space_channels.remove(&channel_id);
                        out.push(Notification::SpaceChannelDeleted {
                            space_id: stream_id,
                            channel_id,
                        });
                    }
                    ChannelOp::Unspecified | ChannelOp::Unrecognized(_) => {}
                }
            }
            Payload::Message { text } => {
                self.messages.insert(
                    event.hash,
                    ChannelMessage {
                        hash: event.hash,
                        creator: event.creator(),
                        text: text.clone(),
                        created_at_ms: event.created_at_ms(),
                    },
                );
                out.push(Notification::ChannelNewMessage {
                    stream_id,
                    hash: event.hash,
                    creator: event.creator(),
                    text: text.clone(),
                });
            }
            Payload::Unrecognized { .. } => {}
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Parent space of a channel.
    pub fn parent_space_id(&self) -> Option<&StreamId> {
        self.parent_space_id.as_ref()
    }

    /// Display metadata declared at inception.
    pub fn properties(&self) -> Option<&ChannelProperties> {
        self.properties.as_ref()
    }

    /// Whether the first batch has been folded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn leaf_frontier(&self) -> &LeafFrontier {
        &self.leaves
    }

    pub fn get_event(&self, hash: &EventHash) -> Option<&Event> {
        self.events.get(hash)
    }

    pub fn contains(&self, hash: &EventHash) -> bool {
        self.events.contains_key(hash)
    }

    /// Number of folded events.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Events in fold order.
    pub fn timeline(&self) -> impl Iterator<Item = &Event> {
        self.timeline.iter().filter_map(|h| self.events.get(h))
    }

    pub fn joined_users(&self) -> &BTreeSet<Address> {
        &self.joined_users
    }

    pub fn invited_users(&self) -> &BTreeSet<Address> {
        &self.invited_users
    }

    pub fn is_joined(&self, user: &Address) -> bool {
        self.joined_users.contains(user)
    }

    pub fn space_channels(&self) -> &BTreeMap<StreamId, ChannelProperties> {
        &self.space_channels
    }

    pub fn user_joined_streams(&self) -> &BTreeSet<StreamId> {
        &self.user_joined_streams
    }

    pub fn user_invited_streams(&self) -> &BTreeSet<StreamId> {
        &self.user_invited_streams
    }

    /// Messages keyed by event hash.
    pub fn messages(&self) -> &BTreeMap<EventHash, ChannelMessage> {
        &self.messages
    }

    /// Messages in fold order.
    pub fn messages_in_order(&self) -> impl Iterator<Item = &ChannelMessage> {
        self.timeline.iter().filter_map(|h| self.messages.get(h))
    }
}

fn check_inception(stream_id: &StreamId, inception: &Inception) -> Result<()> {
    if &inception.stream_id != stream_id {
        return Err(ValidationError::StreamBadEvent(format!(
            "inception declares {}, expected {stream_id}",
            inception.stream_id
        )));
    }
    if stream_id.kind() != Some(inception.kind) {
        return Err(ValidationError::StreamBadEvent(format!(
            "inception kind {} does not match id {stream_id}",
            inception.kind
        )));
    }
    if inception.kind == StreamKind::Channel && inception.space_id.is_none() {
        return Err(ValidationError::StreamBadEvent(format!(
            "channel {stream_id} has no parent space"
        )));
    }
    Ok(())
}

/// Build a view from a stream's full event list.
///
/// The first event must be the inception. Emits `StreamInception` followed by
/// the per-event notifications and a `StreamInitialized` trailer.
pub fn rollup_stream(
    stream_id: &StreamId,
    events: &[Event],
) -> Result<(StreamStateView, Vec<Notification>)> {
    let mut view = StreamStateView::new(stream_id, events.first())?;
    let notifications = view.add_events(events)?;
    Ok((view, notifications))
}
