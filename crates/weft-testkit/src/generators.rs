//! Proptest generators for property-based testing.
//!
//! [`ChainParams`] describes a channel stream as a list of steps. Each step
//! is authored by one of a few parties and either extends the whole leaf
//! frontier or branches off a single earlier event, so generated streams
//! have real forks and merges.

use proptest::prelude::*;

use weft_core::{Event, EventHash, LeafFrontier, MembershipOp, Payload, StreamId};

use crate::fixtures::{multi_party_users, TestUser};

/// What a step does.
#[derive(Debug, Clone)]
pub enum StepAction {
    Invite(usize),
    Join(usize),
    Leave(usize),
    Message(String),
}

/// One event in a generated chain.
#[derive(Debug, Clone)]
pub struct ChainStep {
    /// Index of the authoring party.
    pub author: usize,
    pub action: StepAction,
    /// `Some(i)` names event `i % len` as the only predecessor. `None`
    /// extends the whole frontier.
    pub parent: Option<usize>,
}

/// Parameters for generating a channel stream.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub parties: usize,
    pub steps: Vec<ChainStep>,
}

/// Generate message text.
pub fn message_text() -> impl Strategy<Value = String> {
    "[a-z ]{0,24}".prop_map(String::from)
}

fn step_action(parties: usize) -> impl Strategy<Value = StepAction> {
    prop_oneof![
        (0..parties).prop_map(StepAction::Invite),
        (0..parties).prop_map(StepAction::Join),
        (0..parties).prop_map(StepAction::Leave),
        message_text().prop_map(StepAction::Message),
    ]
}

fn chain_step(parties: usize) -> impl Strategy<Value = ChainStep> {
    (0..parties, step_action(parties), any::<Option<usize>>()).prop_map(
        |(author, action, parent)| ChainStep {
            author,
            action,
            parent,
        },
    )
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (1usize..=4)
            .prop_flat_map(|parties| {
                prop::collection::vec(chain_step(parties), 0..24)
                    .prop_map(move |steps| ChainParams { parties, steps })
            })
            .boxed()
    }
}

/// Build a signed channel stream from parameters.
///
/// The stream starts with the first party's inception and join; every step
/// adds one event.
pub fn channel_from_params(params: &ChainParams) -> (StreamId, Vec<Event>) {
    let users = multi_party_users(params.parties);
    let owner = &users[0];

    let stream_id = StreamId::unique_channel();
    let inception = owner.inception(&stream_id, Some(StreamId::unique_space()));
    let join = owner.membership(MembershipOp::Join, owner.address(), &[inception.hash]);

    let mut events = vec![inception, join];
    let mut frontier = LeafFrontier::new();
    for event in &events {
        frontier.fold(event);
    }

    for step in &params.steps {
        let prevs: Vec<EventHash> = match step.parent {
            Some(i) => vec![events[i % events.len()].hash],
            None => frontier.hashes(),
        };
        let author = &users[step.author % users.len()];
        let event = author.event(step_payload(&users, &step.action), &prevs);
        frontier.fold(&event);
        events.push(event);
    }

    (stream_id, events)
}

fn step_payload(users: &[TestUser], action: &StepAction) -> Payload {
    let user = |i: &usize| users[*i % users.len()].address();
    match action {
        StepAction::Invite(i) => Payload::Membership {
            op: MembershipOp::Invite,
            user: user(i),
        },
        StepAction::Join(i) => Payload::Membership {
            op: MembershipOp::Join,
            user: user(i),
        },
        StepAction::Leave(i) => Payload::Membership {
            op: MembershipOp::Leave,
            user: user(i),
        },
        StepAction::Message(text) => Payload::Message { text: text.clone() },
    }
}
