//! # weft testkit
//!
//! Testing utilities for weft.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Deterministic test users that sign events and build clients
//! - **Generators**: Proptest strategies for forked and merged event chains
//! - **Tracing**: A subscriber that writes through the test harness
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use weft_testkit::generators::{channel_from_params, ChainParams};
//! use weft_view::{rollup_stream, view_digest};
//!
//! proptest! {
//!     #[test]
//!     fn fold_is_deterministic(params: ChainParams) {
//!         let (id, events) = channel_from_params(&params);
//!         let (a, _) = rollup_stream(&id, &events).unwrap();
//!         let (b, _) = rollup_stream(&id, &events).unwrap();
//!         prop_assert_eq!(view_digest(&a), view_digest(&b));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use weft_testkit::fixtures::TestUser;
//!
//! let alice = TestUser::new(1);
//! let (_space, events) = alice.space_genesis();
//! assert_eq!(events.len(), 2);
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_party_users, test_config, TestUser};
pub use generators::{channel_from_params, ChainParams, ChainStep, StepAction};

/// Install a tracing subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .try_init();
}
