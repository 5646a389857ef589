//! # weft sync
//!
//! The RPC surface between clients and nodes, and an in-process node.
//!
//! ## Overview
//!
//! Clients reach nodes only through the [`StreamRpc`] trait. A node hosts
//! streams, applies admission rules, appends node-signed bookkeeping events
//! and serves long-polling `sync_streams` calls.
//!
//! ## Sync Positions
//!
//! Each stream a client follows has an opaque [`SyncCookie`]. A sync call
//! sends the last cookie per stream and gets back, for every stream with new
//! events, the events, the next cookie and the cookie it continues from:
//!
//! ```text
//! Client                                 Node
//!   |-- sync_streams([(s1, c1), (s2, c2)]) -->|
//!   |                                         |  (waits for a change)
//!   |<-- {s1: events, c1' , original c1} -----|
//!   |-- sync_streams([(s1, c1'), (s2, c2)]) ->|
//! ```
//!
//! ## Key Properties
//!
//! - **Resumable**: a cookie fully describes where a client stands
//! - **Ordered**: the original cookie lets clients reject out-of-order slices
//! - **Bounded**: waits are clamped to [`NodeConfig::max_sync_timeout`]

pub mod error;
pub mod messages;
pub mod node;
pub mod rpc;
pub mod rules;

pub use error::{Result, SyncError};
pub use messages::{
    limits, AddEventRequest, CreateStreamRequest, CreateUserRequest, GetEventStreamRequest,
    StreamAndCookie, StreamResponse, SyncCookie, SyncPos, SyncStreamsRequest, SyncStreamsResponse,
};
pub use node::{MemoryNode, NodeConfig};
pub use rpc::StreamRpc;
