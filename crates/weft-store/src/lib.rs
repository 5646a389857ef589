//! # weft store
//!
//! Storage abstraction for weft. Provides a trait-based interface for event
//! log persistence with an in-memory implementation.
//!
//! ## Key Types
//!
//! - [`EventStore`] - The async trait for all storage operations
//! - [`MemoryStore`] - In-memory storage
//! - [`InsertResult`] - Result of appending an event
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: Appending the same event twice returns `AlreadyExists`
//! - **Positions**: A stream position is the count of events stored before it

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::{EventStore, InsertResult};
