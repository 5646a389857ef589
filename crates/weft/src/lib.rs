//! # weft
//!
//! Client sync engine for hash-chained event streams.
//!
//! ## Overview
//!
//! A [`Client`] follows a user's streams on one node:
//!
//! - **User stream**: the user's inbox, listing joined and invited streams
//! - **Spaces**: membership and a channel directory
//! - **Channels**: membership and messages
//!
//! Every event is verified before it is folded into a view. Structural
//! problems reject the whole batch; a bad signature drops just that event.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weft::{Client, ClientConfig};
//! use weft::core::{ChannelProperties, SignerContext, Wallet};
//! use weft::sync::MemoryNode;
//!
//! async fn example() -> weft::Result<()> {
//!     let node = Arc::new(MemoryNode::new(Wallet::generate()));
//!     let client = Client::new(
//!         SignerContext::direct(Wallet::generate()),
//!         node,
//!         ClientConfig::default(),
//!     );
//!
//!     client.create_new_user().await?;
//!     client.start_sync(None).await?;
//!
//!     let space = client.create_space(None, None).await?;
//!     let channel = client
//!         .create_channel(&space, None, ChannelProperties::default())
//!         .await?;
//!     client.send_message(&channel, "hello").await?;
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `weft::core` - Events, stream ids, signing and validation
//! - `weft::store` - Event log storage
//! - `weft::view` - Stream state reduction and notifications
//! - `weft::sync` - RPC surface and in-process node

pub mod client;
pub mod config;
pub mod error;
pub mod stream;

// Re-export component crates
pub use weft_core as core;
pub use weft_store as store;
pub use weft_sync as sync;
pub use weft_view as view;

// Re-export main types for convenience
pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use stream::Stream;

// Re-export commonly used types
pub use weft_core::{Address, Event, EventHash, SignerContext, StreamId, StreamKind, Wallet};
pub use weft_view::{Notification, StreamStateView};
