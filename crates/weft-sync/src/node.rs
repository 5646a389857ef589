//! An in-process node serving the stream RPC surface.
//!
//! The node keeps one reducer per hosted stream to enforce admission rules,
//! persists events through an [`EventStore`], and wakes long-polling
//! `sync_streams` calls through a change counter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use weft_core::{
    make_event, now_millis, validate_event, validate_event_structure, Address, Event, StreamId,
    StreamKind, SignerContext, Wallet,
};
use weft_store::{EventStore, MemoryStore};
use weft_view::{rollup_stream, StreamStateView};

use crate::error::{Result, SyncError};
use crate::messages::{
    AddEventRequest, CreateStreamRequest, CreateUserRequest, GetEventStreamRequest,
    StreamAndCookie, StreamResponse, SyncCookie, SyncPos, SyncStreamsRequest, SyncStreamsResponse,
};
use crate::rpc::StreamRpc;
use crate::rules::{self, DerivedEvent};

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Upper bound on how long a `sync_streams` call is held open.
    pub max_sync_timeout: Duration,
    /// Verify event signatures on admission.
    pub verify_events: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            max_sync_timeout: Duration::from_secs(60),
            verify_events: true,
        }
    }
}

/// In-memory node.
pub struct MemoryNode<S: EventStore = MemoryStore> {
    signer: SignerContext,
    store: S,
    views: Mutex<HashMap<StreamId, StreamStateView>>,
    changes: watch::Sender<u64>,
    config: NodeConfig,
}

impl MemoryNode<MemoryStore> {
    /// Create a node backed by a fresh [`MemoryStore`].
    pub fn new(wallet: Wallet) -> Self {
        Self::with_store(wallet, MemoryStore::new(), NodeConfig::default())
    }
}

impl<S: EventStore> MemoryNode<S> {
    pub fn with_store(wallet: Wallet, store: S, config: NodeConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            signer: SignerContext::direct(wallet),
            store,
            views: Mutex::new(HashMap::new()),
            changes,
            config,
        }
    }

    /// The address node-authored events are signed with.
    pub fn address(&self) -> Address {
        self.signer.creator_address()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn admit(&self, event: &Event) -> Result<()> {
        if self.config.verify_events {
            validate_event(event, now_millis())?;
        } else {
            validate_event_structure(event)?;
        }
        Ok(())
    }

    fn notify(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    async fn insert_stream(
        &self,
        views: &mut HashMap<StreamId, StreamStateView>,
        stream_id: &StreamId,
        events: &[Event],
    ) -> Result<()> {
        for event in events {
            self.admit(event)?;
        }
        let (view, _) = rollup_stream(stream_id, events)?;
        self.store.create_stream(stream_id, events).await?;
        views.insert(stream_id.clone(), view);
        info!(%stream_id, events = events.len(), "stream created");
        Ok(())
    }

    async fn append(
        &self,
        views: &mut HashMap<StreamId, StreamStateView>,
        stream_id: &StreamId,
        event: &Event,
    ) -> Result<()> {
        let view = views
            .get_mut(stream_id)
            .ok_or_else(|| SyncError::StreamNotFound(stream_id.clone()))?;
        view.add_events(std::slice::from_ref(event))?;
        self.store.append_event(stream_id, event).await?;
        Ok(())
    }

    /// Append node-signed events. Targets that are not hosted are skipped.
    async fn append_derived(
        &self,
        views: &mut HashMap<StreamId, StreamStateView>,
        derived: Vec<DerivedEvent>,
    ) -> Result<()> {
        for DerivedEvent { stream_id, payload } in derived {
            let Some(view) = views.get(&stream_id) else {
                debug!(%stream_id, "derived event target not hosted");
                continue;
            };
            let event = make_event(&self.signer, payload, &view.leaf_frontier().hashes())?;
            self.append(views, &stream_id, &event).await?;
        }
        Ok(())
    }

    async fn full_stream(&self, stream_id: &StreamId) -> Result<StreamAndCookie> {
        let events = self
            .store
            .get_stream(stream_id)
            .await?
            .ok_or_else(|| SyncError::StreamNotFound(stream_id.clone()))?;
        Ok(StreamAndCookie {
            stream_id: stream_id.clone(),
            sync_cookie: SyncCookie::new(stream_id.clone(), events.len() as u64),
            events,
            original_sync_cookie: None,
        })
    }

    async fn create_joinable(
        &self,
        kind: StreamKind,
        request: CreateStreamRequest,
    ) -> Result<StreamResponse> {
        let stream_id = &request.stream_id;
        {
            let mut views = self.views.lock().await;
            let derived = rules::check_joinable_creation(&views, kind, stream_id, &request.events)?;
            self.insert_stream(&mut views, stream_id, &request.events)
                .await?;
            self.append_derived(&mut views, derived).await?;
        }
        self.notify();
        Ok(StreamResponse {
            stream: self.full_stream(stream_id).await?,
        })
    }

    async fn collect(&self, positions: &[SyncPos]) -> Result<SyncStreamsResponse> {
        let mut response = SyncStreamsResponse::default();
        for pos in positions {
            let Some(len) = self.store.stream_len(&pos.stream_id).await? else {
                continue;
            };
            let position = pos.sync_cookie.position();
            if position > len {
                return Err(SyncError::InvalidRequest(format!(
                    "cookie position {position} is past the end of {}",
                    pos.stream_id
                )));
            }
            let events = self.store.events_since(&pos.stream_id, position).await?;
            if events.is_empty() {
                continue;
            }
            let next = SyncCookie::new(pos.stream_id.clone(), position + events.len() as u64);
            response.streams.insert(
                pos.stream_id.clone(),
                StreamAndCookie {
                    stream_id: pos.stream_id.clone(),
                    events,
                    sync_cookie: next,
                    original_sync_cookie: Some(pos.sync_cookie.clone()),
                },
            );
        }
        Ok(response)
    }
}

#[async_trait]
impl<S: EventStore> StreamRpc for MemoryNode<S> {
    async fn create_user(&self, request: CreateUserRequest) -> Result<StreamResponse> {
        let stream_id = {
            let mut views = self.views.lock().await;
            let stream_id = rules::check_user_creation(&views, &request.events)?;
            self.insert_stream(&mut views, &stream_id, &request.events)
                .await?;
            stream_id
        };
        self.notify();
        Ok(StreamResponse {
            stream: self.full_stream(&stream_id).await?,
        })
    }

    async fn get_event_stream(&self, request: GetEventStreamRequest) -> Result<StreamResponse> {
        Ok(StreamResponse {
            stream: self.full_stream(&request.stream_id).await?,
        })
    }

    async fn create_space(&self, request: CreateStreamRequest) -> Result<StreamResponse> {
        self.create_joinable(StreamKind::Space, request).await
    }

    async fn create_channel(&self, request: CreateStreamRequest) -> Result<StreamResponse> {
        self.create_joinable(StreamKind::Channel, request).await
    }

    async fn add_event(&self, request: AddEventRequest) -> Result<()> {
        let AddEventRequest { stream_id, event } = request;
        {
            let mut views = self.views.lock().await;
            let view = views
                .get(&stream_id)
                .ok_or_else(|| SyncError::StreamNotFound(stream_id.clone()))?;
            let space = view.parent_space_id().and_then(|id| views.get(id));
            let derived = rules::check_add_event(&self.address(), view, space, &event)?;

            self.admit(&event)?;
            self.append(&mut views, &stream_id, &event).await?;
            self.append_derived(&mut views, derived).await?;
        }
        debug!(%stream_id, hash = %event.hash, payload = event.payload().name(), "event added");
        self.notify();
        Ok(())
    }

    async fn sync_streams(&self, request: SyncStreamsRequest) -> Result<SyncStreamsResponse> {
        request.validate()?;
        let timeout = request.timeout.min(self.config.max_sync_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut changes = self.changes.subscribe();

        loop {
            let response = self.collect(&request.positions).await?;
            if !response.streams.is_empty() {
                return Ok(response);
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Ok(SyncStreamsResponse::default()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{EventHash, Inception, MembershipOp, Payload};

    fn wallet(seed: u8) -> Wallet {
        Wallet::from_seed(&[seed; 32]).unwrap()
    }

    fn inception(ctx: &SignerContext, stream_id: &StreamId, space_id: Option<StreamId>) -> Event {
        let payload = Payload::Inception(Inception {
            stream_id: stream_id.clone(),
            kind: stream_id.kind().unwrap(),
            space_id,
            properties: None,
        });
        make_event::<EventHash>(ctx, payload, &[]).unwrap()
    }

    fn membership(
        ctx: &SignerContext,
        op: MembershipOp,
        user: Address,
        prev: &[EventHash],
    ) -> Event {
        make_event(ctx, Payload::Membership { op, user }, prev).unwrap()
    }

    async fn create_user(node: &MemoryNode, ctx: &SignerContext) -> StreamAndCookie {
        let user_stream = StreamId::for_user(&ctx.creator_address());
        node.create_user(CreateUserRequest {
            events: vec![inception(ctx, &user_stream, None)],
        })
        .await
        .unwrap()
        .stream
    }

    async fn create_space(node: &MemoryNode, ctx: &SignerContext) -> StreamAndCookie {
        let space = StreamId::unique_space();
        let first = inception(ctx, &space, None);
        let join = membership(ctx, MembershipOp::Join, ctx.creator_address(), &[first.hash]);
        node.create_space(CreateStreamRequest {
            stream_id: space,
            events: vec![first, join],
        })
        .await
        .unwrap()
        .stream
    }

    #[tokio::test]
    async fn test_create_user_twice_fails() {
        let node = MemoryNode::new(wallet(9));
        let alice = SignerContext::direct(wallet(1));
        let stream = create_user(&node, &alice).await;
        assert_eq!(stream.events.len(), 1);
        assert_eq!(stream.sync_cookie.position(), 1);

        let again = node
            .create_user(CreateUserRequest {
                events: vec![inception(&alice, &stream.stream_id, None)],
            })
            .await;
        assert!(matches!(again, Err(SyncError::StreamExists(_))));
    }

    #[tokio::test]
    async fn test_create_space_records_join_in_user_stream() {
        let node = MemoryNode::new(wallet(9));
        let alice = SignerContext::direct(wallet(1));
        let user = create_user(&node, &alice).await;
        let space = create_space(&node, &alice).await;
        assert_eq!(space.events.len(), 2);

        let user_now = node
            .get_event_stream(GetEventStreamRequest {
                stream_id: user.stream_id.clone(),
            })
            .await
            .unwrap()
            .stream;
        assert_eq!(user_now.events.len(), 2);
        let derived = &user_now.events[1];
        assert_eq!(derived.creator(), node.address());
        assert_eq!(
            derived.payload(),
            &Payload::UserMembership {
                op: MembershipOp::Join,
                stream_id: space.stream_id.clone(),
            }
        );
    }

    #[tokio::test]
    async fn test_add_event_rejects_tampered_event() {
        let node = MemoryNode::new(wallet(9));
        let alice = SignerContext::direct(wallet(1));
        let bob = SignerContext::direct(wallet(2));
        create_user(&node, &alice).await;
        let space = create_space(&node, &alice).await;
        let head = space.events[1].hash;

        let mut invite = membership(&alice, MembershipOp::Invite, bob.creator_address(), &[head]);
        invite.signature = weft_core::Signature::ZERO;
        let result = node
            .add_event(AddEventRequest {
                stream_id: space.stream_id.clone(),
                event: invite,
            })
            .await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test]
    async fn test_sync_streams_returns_new_events() {
        let node = MemoryNode::new(wallet(9));
        let alice = SignerContext::direct(wallet(1));
        let bob = SignerContext::direct(wallet(2));
        create_user(&node, &alice).await;
        let space = create_space(&node, &alice).await;

        let pos = SyncPos {
            stream_id: space.stream_id.clone(),
            sync_cookie: space.sync_cookie.clone(),
        };

        // nothing new: returns empty after the timeout
        let empty = node
            .sync_streams(SyncStreamsRequest {
                positions: vec![pos.clone()],
                timeout: Duration::from_millis(20),
            })
            .await
            .unwrap();
        assert!(empty.streams.is_empty());

        let invite = membership(
            &alice,
            MembershipOp::Invite,
            bob.creator_address(),
            &[space.events[1].hash],
        );
        node.add_event(AddEventRequest {
            stream_id: space.stream_id.clone(),
            event: invite.clone(),
        })
        .await
        .unwrap();

        let response = node
            .sync_streams(SyncStreamsRequest {
                positions: vec![pos],
                timeout: Duration::from_secs(1),
            })
            .await
            .unwrap();
        let slice = &response.streams[&space.stream_id];
        assert_eq!(slice.events, vec![invite]);
        assert_eq!(slice.original_sync_cookie.as_ref(), Some(&space.sync_cookie));
        assert_eq!(slice.sync_cookie.position(), 3);
    }

    #[tokio::test]
    async fn test_sync_streams_wakes_on_change() {
        let node = std::sync::Arc::new(MemoryNode::new(wallet(9)));
        let alice = SignerContext::direct(wallet(1));
        create_user(&node, &alice).await;
        let space = create_space(&node, &alice).await;

        let waiter = {
            let node = node.clone();
            let pos = SyncPos {
                stream_id: space.stream_id.clone(),
                sync_cookie: space.sync_cookie.clone(),
            };
            tokio::spawn(async move {
                node.sync_streams(SyncStreamsRequest {
                    positions: vec![pos],
                    timeout: Duration::from_secs(5),
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let msg_space_invite = membership(
            &alice,
            MembershipOp::Invite,
            wallet(3).address(),
            &[space.events[1].hash],
        );
        node.add_event(AddEventRequest {
            stream_id: space.stream_id.clone(),
            event: msg_space_invite,
        })
        .await
        .unwrap();

        let response = waiter.await.unwrap().unwrap();
        assert!(response.streams.contains_key(&space.stream_id));
    }

    #[tokio::test]
    async fn test_cookie_past_end_is_invalid() {
        let node = MemoryNode::new(wallet(9));
        let alice = SignerContext::direct(wallet(1));
        let user = create_user(&node, &alice).await;
        let result = node
            .sync_streams(SyncStreamsRequest {
                positions: vec![SyncPos {
                    stream_id: user.stream_id.clone(),
                    sync_cookie: SyncCookie::new(user.stream_id, 7),
                }],
                timeout: Duration::ZERO,
            })
            .await;
        assert!(matches!(result, Err(SyncError::InvalidRequest(_))));
    }
}
