//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::time::Duration;

use weft::{Client, ClientConfig};
use weft_core::{
    keccak256, make_event, Address, Event, EventHash, Inception, MembershipOp, Payload,
    SignerContext, StreamId, Wallet,
};
use weft_sync::StreamRpc;

/// A test user with a deterministic wallet.
#[derive(Clone)]
pub struct TestUser {
    pub wallet: Wallet,
    pub signer: SignerContext,
}

impl TestUser {
    /// Create the user for `index`. The same index always yields the same key.
    pub fn new(index: u32) -> Self {
        let seed = keccak256(format!("weft-test-user:{index}").as_bytes());
        let wallet = Wallet::from_seed(&seed).expect("keccak output is a valid secret key");
        Self {
            signer: SignerContext::direct(wallet.clone()),
            wallet,
        }
    }

    /// A user signing through a delegate key that expires at `expiry_ms`.
    pub fn delegated(index: u32, expiry_ms: i64) -> Self {
        let primary = Self::new(index);
        let delegate = Self::new(index + 10_000);
        let signer = SignerContext::delegated(&primary.wallet, delegate.wallet, expiry_ms)
            .expect("delegation signs");
        Self {
            wallet: primary.wallet,
            signer,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.creator_address()
    }

    pub fn user_stream_id(&self) -> StreamId {
        StreamId::for_user(&self.address())
    }

    /// Sign `payload` on top of `prevs`.
    pub fn event(&self, payload: Payload, prevs: &[EventHash]) -> Event {
        make_event(&self.signer, payload, prevs).expect("event signs")
    }

    /// The inception for `stream_id`, whose kind comes from the id prefix.
    pub fn inception(&self, stream_id: &StreamId, space_id: Option<StreamId>) -> Event {
        let kind = stream_id.kind().expect("stream id has a kind prefix");
        let payload = Payload::Inception(Inception {
            stream_id: stream_id.clone(),
            kind,
            space_id,
            properties: None,
        });
        self.event(payload, &[])
    }

    pub fn user_inception(&self) -> Event {
        self.inception(&self.user_stream_id(), None)
    }

    pub fn membership(&self, op: MembershipOp, user: Address, prevs: &[EventHash]) -> Event {
        self.event(Payload::Membership { op, user }, prevs)
    }

    pub fn message(&self, text: &str, prevs: &[EventHash]) -> Event {
        self.event(Payload::Message { text: text.into() }, prevs)
    }

    /// `[inception, join]` for a new space created by this user.
    pub fn space_genesis(&self) -> (StreamId, Vec<Event>) {
        let stream_id = StreamId::unique_space();
        let inception = self.inception(&stream_id, None);
        let join = self.membership(MembershipOp::Join, self.address(), &[inception.hash]);
        (stream_id, vec![inception, join])
    }

    /// A client for this user with [`test_config`].
    pub fn client<R: StreamRpc + 'static>(&self, rpc: R) -> Client {
        Client::new(self.signer.clone(), rpc, test_config())
    }
}

/// Client configuration with short timeouts.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        sync_timeout: Duration::from_millis(500),
        retry_delay: Duration::from_millis(10),
        ..ClientConfig::default()
    }
}

/// Create multiple test users for multi-party tests.
pub fn multi_party_users(count: usize) -> Vec<TestUser> {
    (1..=count as u32).map(TestUser::new).collect()
}
