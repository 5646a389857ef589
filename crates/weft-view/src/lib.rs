//! # weft view
//!
//! Deterministic reduction of stream events into materialized state.
//!
//! ## Overview
//!
//! A [`StreamStateView`] folds one stream's events in arrival order. Each
//! payload kind updates a derived set and emits a typed [`Notification`]:
//!
//! - **User streams**: joined and invited streams of the owning user
//! - **Spaces**: members, invitees and the channel directory
//! - **Channels**: members, invitees and messages
//!
//! Batches are atomic: a batch that fails any check is rejected before the
//! view is touched. Views are never rolled back.
//!
//! [`view_digest`] hashes the derived sets so replicas can compare state.

pub mod digest;
pub mod notification;
pub mod state;

pub use digest::{view_digest, ViewDigest};
pub use notification::Notification;
pub use state::{rollup_stream, ChannelMessage, StreamStateView};

/// Reducer errors are the core validation errors.
pub type Result<T> = std::result::Result<T, weft_core::ValidationError>;
