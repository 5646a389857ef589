//! Deterministic digests of materialized stream state.
//!
//! Two views that folded the same ordered events produce the same digest, so
//! replicas can compare state without exchanging it.

use std::fmt;

use crate::state::StreamStateView;

const VIEW_DOMAIN: &[u8] = b"weft-view-v0:";

/// Blake3 digest of a view's derived sets.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewDigest(pub [u8; 32]);

impl ViewDigest {
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ViewDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewDigest({})", &self.to_hex()[..16])
    }
}

fn update_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn update_len(hasher: &mut blake3::Hasher, len: usize) {
    hasher.update(&(len as u64).to_le_bytes());
}

/// Compute the digest of a view.
///
/// Covers the stream identity, the leaf frontier, and every derived set in
/// its sorted order. Each section is length-prefixed.
pub fn view_digest(view: &StreamStateView) -> ViewDigest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(VIEW_DOMAIN);
    update_str(&mut hasher, view.stream_id().as_str());
    hasher.update(&[view.kind().to_u8()]);

    let leaves = view.leaf_frontier();
    update_len(&mut hasher, leaves.len());
    for hash in leaves.iter() {
        hasher.update(hash.as_bytes());
    }

    for users in [view.joined_users(), view.invited_users()] {
        update_len(&mut hasher, users.len());
        for user in users {
            hasher.update(user.as_bytes());
        }
    }

    let channels = view.space_channels();
    update_len(&mut hasher, channels.len());
    for (channel_id, props) in channels {
        update_str(&mut hasher, channel_id.as_str());
        update_str(&mut hasher, &props.name);
        update_str(&mut hasher, &props.topic);
    }

    for streams in [view.user_joined_streams(), view.user_invited_streams()] {
        update_len(&mut hasher, streams.len());
        for stream_id in streams {
            update_str(&mut hasher, stream_id.as_str());
        }
    }

    let messages = view.messages();
    update_len(&mut hasher, messages.len());
    for (hash, message) in messages {
        hasher.update(hash.as_bytes());
        hasher.update(message.creator.as_bytes());
        update_str(&mut hasher, &message.text);
    }

    ViewDigest(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::rollup_stream;
    use weft_core::{
        make_event, ChannelProperties, Event, EventHash, Inception, MembershipOp, Payload,
        SignerContext, StreamId, StreamKind, Wallet,
    };

    fn space_events(ctx: &SignerContext, space: &StreamId) -> Vec<Event> {
        let first = make_event::<EventHash>(
            ctx,
            Payload::Inception(Inception {
                stream_id: space.clone(),
                kind: StreamKind::Space,
                space_id: None,
                properties: Some(ChannelProperties {
                    name: "space".into(),
                    topic: String::new(),
                }),
            }),
            &[],
        )
        .unwrap();
        let join = make_event(
            ctx,
            Payload::Membership {
                op: MembershipOp::Join,
                user: ctx.creator_address(),
            },
            &[first.hash],
        )
        .unwrap();
        vec![first, join]
    }

    #[test]
    fn test_same_events_same_digest() {
        let ctx = SignerContext::direct(Wallet::from_seed(&[1; 32]).unwrap());
        let space = StreamId::unique_space();
        let events = space_events(&ctx, &space);

        let (a, _) = rollup_stream(&space, &events).unwrap();
        let (b, _) = rollup_stream(&space, &events).unwrap();
        assert_eq!(view_digest(&a), view_digest(&b));
    }

    #[test]
    fn test_digest_tracks_state() {
        let ctx = SignerContext::direct(Wallet::from_seed(&[1; 32]).unwrap());
        let space = StreamId::unique_space();
        let events = space_events(&ctx, &space);

        let (short, _) = rollup_stream(&space, &events[..1]).unwrap();
        let (full, _) = rollup_stream(&space, &events).unwrap();
        assert_ne!(view_digest(&short), view_digest(&full));
    }
}
