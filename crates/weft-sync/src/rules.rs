//! Admission rules a node applies before it accepts events.
//!
//! These checks are about who may write what. Event integrity and causal
//! shape are checked separately by validation and the stream reducer.

use std::collections::HashMap;

use weft_core::{
    Address, ChannelOp, Event, Inception, MembershipOp, Payload, StreamId, StreamKind,
};
use weft_view::StreamStateView;

use crate::error::{Result, SyncError};
use crate::messages::limits;

/// A node-authored event that must follow an accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedEvent {
    pub stream_id: StreamId,
    pub payload: Payload,
}

fn inception_of<'a>(
    event: &'a Event,
    kind: StreamKind,
    stream_id: &StreamId,
) -> Result<&'a Inception> {
    let inception = event.inception().ok_or_else(|| {
        SyncError::BadStreamCreation(format!("first event of {stream_id} is not an inception"))
    })?;
    if inception.kind != kind || &inception.stream_id != stream_id {
        return Err(SyncError::BadStreamCreation(format!(
            "inception declares {} {}, expected {kind} {stream_id}",
            inception.kind, inception.stream_id
        )));
    }
    Ok(inception)
}

fn check_not_exists(
    views: &HashMap<StreamId, StreamStateView>,
    stream_id: &StreamId,
) -> Result<()> {
    if views.contains_key(stream_id) {
        return Err(SyncError::StreamExists(stream_id.clone()));
    }
    Ok(())
}

/// `create_user`: a single User inception for the creator's own stream.
pub fn check_user_creation(
    views: &HashMap<StreamId, StreamStateView>,
    events: &[Event],
) -> Result<StreamId> {
    let [inception] = events else {
        return Err(SyncError::BadStreamCreation(format!(
            "user stream needs exactly 1 event, got {}",
            events.len()
        )));
    };
    let stream_id = StreamId::for_user(&inception.creator());
    inception_of(inception, StreamKind::User, &stream_id)?;
    check_not_exists(views, &stream_id)?;
    Ok(stream_id)
}

/// `create_space` and `create_channel`: `[inception, join by creator]`.
///
/// Returns the node events to append once the stream exists.
pub fn check_joinable_creation(
    views: &HashMap<StreamId, StreamStateView>,
    kind: StreamKind,
    stream_id: &StreamId,
    events: &[Event],
) -> Result<Vec<DerivedEvent>> {
    if events.len() > limits::MAX_CREATE_EVENTS {
        return Err(SyncError::InvalidRequest(format!(
            "too many creation events: {}",
            events.len()
        )));
    }
    let [first, join] = events else {
        return Err(SyncError::BadStreamCreation(format!(
            "{kind} stream needs exactly 2 events, got {}",
            events.len()
        )));
    };

    let inception = inception_of(first, kind, stream_id)?;
    let creator = first.creator();

    match join.payload() {
        Payload::Membership {
            op: MembershipOp::Join,
            user,
        } if *user == creator && join.creator() == creator => {}
        _ => {
            return Err(SyncError::BadStreamCreation(format!(
                "second event of {stream_id} must be the creator joining"
            )))
        }
    }

    check_not_exists(views, stream_id)?;

    let user_stream = StreamId::for_user(&creator);
    if !views.contains_key(&user_stream) {
        return Err(SyncError::BadStreamCreation(format!(
            "creator {creator} has no user stream"
        )));
    }

    let mut derived = vec![DerivedEvent {
        stream_id: user_stream,
        payload: Payload::UserMembership {
            op: MembershipOp::Join,
            stream_id: stream_id.clone(),
        },
    }];

    if kind == StreamKind::Channel {
        let space_id = inception.space_id.clone().ok_or_else(|| {
            SyncError::BadStreamCreation(format!("channel {stream_id} has no space id"))
        })?;
        let space = views
            .get(&space_id)
            .ok_or_else(|| SyncError::StreamNotFound(space_id.clone()))?;
        if !space.is_joined(&creator) {
            return Err(SyncError::PermissionDenied(format!(
                "{creator} is not a member of {space_id}"
            )));
        }
        derived.push(DerivedEvent {
            stream_id: space_id,
            payload: Payload::Channel {
                op: ChannelOp::Created,
                channel_id: stream_id.clone(),
                properties: inception.properties.clone(),
            },
        });
    }

    Ok(derived)
}

fn require_joined(view: &StreamStateView, user: &Address) -> Result<()> {
    if !view.is_joined(user) {
        return Err(SyncError::PermissionDenied(format!(
            "{user} is not a member of {}",
            view.stream_id()
        )));
    }
    Ok(())
}

/// `add_event`: checks one event against the target stream.
///
/// `space` is the parent space view when the target is a channel. Returns the
/// node events to append once the event is accepted.
pub fn check_add_event(
    node: &Address,
    view: &StreamStateView,
    space: Option<&StreamStateView>,
    event: &Event,
) -> Result<Vec<DerivedEvent>> {
    let stream_id = view.stream_id();
    let creator = event.creator();

    if event.is_inception() {
        return Err(SyncError::InvalidRequest(format!(
            "inception cannot be added to existing stream {stream_id}"
        )));
    }
    if event.prev_events().is_empty() {
        return Err(SyncError::InvalidRequest(format!(
            "event {} has no prev events",
            event.hash
        )));
    }
    let payload = event.payload();
    if !payload.allowed_in(view.kind()) {
        return Err(SyncError::InvalidRequest(format!(
            "{} payload not allowed in {} stream {stream_id}",
            payload.name(),
            view.kind()
        )));
    }

    match payload {
        Payload::UserMembership { .. } => {
            if &creator != node {
                return Err(SyncError::PermissionDenied(
                    "user membership events are written by the node".into(),
                ));
            }
            Ok(Vec::new())
        }
        Payload::Membership { op, user } => {
            match op {
                MembershipOp::Join => {
                    if *user != creator {
                        return Err(SyncError::PermissionDenied(format!(
                            "{creator} cannot join on behalf of {user}"
                        )));
                    }
                    if view.is_joined(user) {
                        return Err(SyncError::AlreadyMember {
                            stream_id: stream_id.clone(),
                            user: user.to_string(),
                        });
                    }
                    if let Some(space) = space {
                        require_joined(space, &creator)?;
                    }
                }
                MembershipOp::Invite => {
                    require_joined(view, &creator)?;
                    if view.is_joined(user) {
                        return Err(SyncError::AlreadyMember {
                            stream_id: stream_id.clone(),
                            user: user.to_string(),
                        });
                    }
                }
                MembershipOp::Leave => {
                    if *user != creator {
                        return Err(SyncError::PermissionDenied(format!(
                            "{creator} cannot remove {user}"
                        )));
                    }
                    if !view.is_joined(user) {
                        return Err(SyncError::NotMember {
                            stream_id: stream_id.clone(),
                            user: user.to_string(),
                        });
                    }
                }
                MembershipOp::Unspecified | MembershipOp::Unrecognized(_) => {
                    return Err(SyncError::InvalidRequest(format!(
                        "membership op {} is not supported",
                        op.to_u32()
                    )));
                }
            }
            Ok(vec![DerivedEvent {
                stream_id: StreamId::for_user(user),
                payload: Payload::UserMembership {
                    op: *op,
                    stream_id: stream_id.clone(),
                },
            }])
        }
        Payload::Channel { .. } | Payload::Message { .. } => {
            require_joined(view, &creator)?;
            Ok(Vec::new())
        }
        Payload::Inception(_) | Payload::Unrecognized { .. } => Err(SyncError::InvalidRequest(
            format!("{} payload cannot be added", payload.name()),
        )),
    }
}
