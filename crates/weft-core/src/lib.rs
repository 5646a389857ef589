//! # weft core
//!
//! Pure primitives for weft: events, stream ids, leaf frontiers and
//! authorship verification.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over signed, hash-linked events.
//!
//! ## Key Types
//!
//! - [`Event`] - A signed, hash-identified record in a stream
//! - [`EventHash`] - Content-derived identifier (keccak256 over the canonical body)
//! - [`StreamId`] - A kind-prefixed stream identifier
//! - [`LeafFrontier`] - The unreferenced heads of a stream
//! - [`SignerContext`] - Direct or delegated signing identity
//!
//! ## Canonicalization
//!
//! Event bodies are encoded using deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod event;
pub mod frontier;
pub mod signer;
pub mod stream;
pub mod types;
pub mod validation;

pub use canonical::canonical_body_bytes;
pub use crypto::{keccak256, PublicKey, Signature, Wallet};
pub use error::{CoreError, ValidationError};
pub use event::{
    make_event, now_millis, ChannelOp, ChannelProperties, Event, EventBody, EventBuilder,
    Inception, MembershipOp, Payload,
};
pub use frontier::LeafFrontier;
pub use signer::{DelegateSig, SignerContext};
pub use stream::{StreamId, StreamKind};
pub use types::{Address, EventHash};
pub use validation::{validate_event, validate_event_structure, verify_authorship};
