//! The stream RPC surface.
//!
//! Clients talk to nodes only through this trait. Implementations may use
//! HTTP, WebSockets or an in-process node; see [`crate::node::MemoryNode`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::messages::{
    AddEventRequest, CreateStreamRequest, CreateUserRequest, GetEventStreamRequest,
    StreamResponse, SyncStreamsRequest, SyncStreamsResponse,
};

/// Request/response calls a node serves.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StreamRpc: Send + Sync {
    /// Create a user stream from its inception.
    async fn create_user(&self, request: CreateUserRequest) -> Result<StreamResponse>;

    /// Fetch a whole stream with a cookie at its current end.
    async fn get_event_stream(&self, request: GetEventStreamRequest) -> Result<StreamResponse>;

    /// Create a space from `[inception, join]`.
    async fn create_space(&self, request: CreateStreamRequest) -> Result<StreamResponse>;

    /// Create a channel from `[inception, join]`.
    async fn create_channel(&self, request: CreateStreamRequest) -> Result<StreamResponse>;

    /// Append one event to an existing stream.
    async fn add_event(&self, request: AddEventRequest) -> Result<()>;

    /// Long-poll for events after each position.
    ///
    /// Returns as soon as any stream has new events, or with an empty
    /// response once `timeout` passes.
    async fn sync_streams(&self, request: SyncStreamsRequest) -> Result<SyncStreamsResponse>;
}

#[async_trait]
impl<T: StreamRpc + ?Sized> StreamRpc for Arc<T> {
    async fn create_user(&self, request: CreateUserRequest) -> Result<StreamResponse> {
        (**self).create_user(request).await
    }

    async fn get_event_stream(&self, request: GetEventStreamRequest) -> Result<StreamResponse> {
        (**self).get_event_stream(request).await
    }

    async fn create_space(&self, request: CreateStreamRequest) -> Result<StreamResponse> {
        (**self).create_space(request).await
    }

    async fn create_channel(&self, request: CreateStreamRequest) -> Result<StreamResponse> {
        (**self).create_channel(request).await
    }

    async fn add_event(&self, request: AddEventRequest) -> Result<()> {
        (**self).add_event(request).await
    }

    async fn sync_streams(&self, request: SyncStreamsRequest) -> Result<SyncStreamsResponse> {
        (**self).sync_streams(request).await
    }
}
