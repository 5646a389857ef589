//! The client: a user's streams and the loop that keeps them in sync.
//!
//! A [`Client`] owns one [`Stream`] per stream the user follows. Streams are
//! looked up by id; nothing outside the client holds a view. Folding a batch
//! emits [`Notification`]s that are broadcast to every subscriber once the
//! arena lock is released.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use weft_core::{
    make_event, Address, ChannelProperties, Event, EventHash, Inception, LeafFrontier,
    MembershipOp, Payload, SignerContext, StreamId, StreamKind,
};
use weft_sync::{
    AddEventRequest, CreateStreamRequest, CreateUserRequest, GetEventStreamRequest,
    StreamAndCookie, StreamRpc, SyncCookie, SyncPos, SyncStreamsRequest, SyncStreamsResponse,
};
use weft_view::{view_digest, Notification, StreamStateView, ViewDigest};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::stream::Stream;

/// Streams held by a client.
#[derive(Default)]
struct ClientState {
    streams: HashMap<StreamId, Stream>,
    user_stream_id: Option<StreamId>,
}

/// The running sync loop, if any.
struct SyncHandle {
    id: u64,
    token: CancellationToken,
}

struct Inner {
    signer: SignerContext,
    rpc: Arc<dyn StreamRpc>,
    config: ClientConfig,
    state: RwLock<ClientState>,
    sync: Mutex<Option<SyncHandle>>,
    /// Why the last sync loop ended, if it ended with an error.
    sync_error: Mutex<Option<ClientError>>,
    next_sync_id: AtomicU64,
    notifications: broadcast::Sender<Notification>,
}

/// A user session against one node.
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Create a client that signs with `signer` and talks to `rpc`.
    pub fn new<R>(signer: SignerContext, rpc: R, config: ClientConfig) -> Self
    where
        R: StreamRpc + 'static,
    {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                signer,
                rpc: Arc::new(rpc),
                config,
                state: RwLock::new(ClientState::default()),
                sync: Mutex::new(None),
                sync_error: Mutex::new(None),
                next_sync_id: AtomicU64::new(0),
                notifications,
            }),
        }
    }

    /// Receive every notification emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    /// The address events are created for.
    pub fn user_id(&self) -> Address {
        self.inner.signer.creator_address()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The booted user stream, if any.
    pub async fn user_stream_id(&self) -> Option<StreamId> {
        self.inner.state.read().await.user_stream_id.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User Stream
    // ─────────────────────────────────────────────────────────────────────────

    /// Create this user's stream on the node and boot it.
    pub async fn create_new_user(&self) -> Result<StreamId> {
        let stream_id = StreamId::for_user(&self.user_id());
        let inception = make_event::<EventHash>(
            &self.inner.signer,
            Payload::Inception(Inception {
                stream_id: stream_id.clone(),
                kind: StreamKind::User,
                space_id: None,
                properties: None,
            }),
            &[],
        )?;

        debug!(%stream_id, "create_user");
        let response = self
            .inner
            .rpc
            .create_user(CreateUserRequest {
                events: vec![inception],
            })
            .await?;
        info!(%stream_id, "user created");

        self.init_user_stream(&response.stream).await?;
        Ok(stream_id)
    }

    /// Fetch this user's existing stream and boot it.
    pub async fn load_existing_user(&self) -> Result<StreamId> {
        let stream_id = StreamId::for_user(&self.user_id());
        debug!(%stream_id, "get_event_stream");
        let response = self
            .inner
            .rpc
            .get_event_stream(GetEventStreamRequest {
                stream_id: stream_id.clone(),
            })
            .await?;
        info!(%stream_id, events = response.stream.events.len(), "user loaded");

        self.init_user_stream(&response.stream).await?;
        Ok(stream_id)
    }

    async fn init_user_stream(&self, slice: &StreamAndCookie) -> Result<()> {
        let (stream, notifications) =
            Stream::from_stream_and_cookie(slice, self.inner.config.verify_events)?;
        let mut worklist: VecDeque<StreamId> =
            stream.view().user_joined_streams().iter().cloned().collect();

        {
            let mut state = self.inner.state.write().await;
            state.user_stream_id = Some(slice.stream_id.clone());
            state.streams.insert(slice.stream_id.clone(), stream);
        }
        self.inner.publish(notifications);

        while let Some(stream_id) = worklist.pop_front() {
            self.inner.init_stream(&stream_id).await?;
        }
        Ok(())
    }

    /// Load a stream from the node unless it is already held.
    pub async fn init_stream(&self, stream_id: &StreamId) -> Result<()> {
        self.inner.init_stream(stream_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authored Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a space and join it. Returns the space id.
    pub async fn create_space(
        &self,
        space_id: Option<StreamId>,
        properties: Option<ChannelProperties>,
    ) -> Result<StreamId> {
        let stream_id = space_id.unwrap_or_else(StreamId::unique_space);
        let events = self.inception_and_join(&stream_id, StreamKind::Space, None, properties)?;

        debug!(%stream_id, "create_space");
        let response = self
            .inner
            .rpc
            .create_space(CreateStreamRequest {
                stream_id: stream_id.clone(),
                events,
            })
            .await?;
        self.inner.adopt(&response.stream).await?;
        Ok(stream_id)
    }

    /// Create a channel in `space_id` and join it. Returns the channel id.
    pub async fn create_channel(
        &self,
        space_id: &StreamId,
        channel_id: Option<StreamId>,
        properties: ChannelProperties,
    ) -> Result<StreamId> {
        let stream_id = channel_id.unwrap_or_else(StreamId::unique_channel);
        let events = self.inception_and_join(
            &stream_id,
            StreamKind::Channel,
            Some(space_id.clone()),
            Some(properties),
        )?;

        debug!(%stream_id, %space_id, "create_channel");
        let response = self
            .inner
            .rpc
            .create_channel(CreateStreamRequest {
                stream_id: stream_id.clone(),
                events,
            })
            .await?;
        self.inner.adopt(&response.stream).await?;
        Ok(stream_id)
    }

    pub async fn send_message(
        &self,
        stream_id: &StreamId,
        text: impl Into<String>,
    ) -> Result<EventHash> {
        let payload = Payload::Message { text: text.into() };
        self.make_event_and_add_to_stream(stream_id, payload).await
    }

    pub async fn invite_user(&self, stream_id: &StreamId, user: Address) -> Result<EventHash> {
        let payload = Payload::Membership {
            op: MembershipOp::Invite,
            user,
        };
        self.make_event_and_add_to_stream(stream_id, payload).await
    }

    /// Join a stream, loading it first if needed.
    pub async fn join_stream(&self, stream_id: &StreamId) -> Result<EventHash> {
        self.inner.init_stream(stream_id).await?;
        let payload = Payload::Membership {
            op: MembershipOp::Join,
            user: self.user_id(),
        };
        self.make_event_and_add_to_stream(stream_id, payload).await
    }

    pub async fn leave_stream(&self, stream_id: &StreamId) -> Result<EventHash> {
        let payload = Payload::Membership {
            op: MembershipOp::Leave,
            user: self.user_id(),
        };
        self.make_event_and_add_to_stream(stream_id, payload).await
    }

    /// Sign `payload` on top of the stream's current leaves and submit it.
    ///
    /// The event is not folded locally; it arrives through sync like any
    /// other event.
    pub async fn make_event_and_add_to_stream(
        &self,
        stream_id: &StreamId,
        payload: Payload,
    ) -> Result<EventHash> {
        let prevs = self.leaf_frontier(stream_id).await?.hashes();
        let event = make_event(&self.inner.signer, payload, &prevs)?;
        let hash = event.hash;

        debug!(%stream_id, %hash, payload = event.payload().name(), "add_event");
        self.inner
            .rpc
            .add_event(AddEventRequest {
                stream_id: stream_id.clone(),
                event,
            })
            .await?;
        Ok(hash)
    }

    fn inception_and_join(
        &self,
        stream_id: &StreamId,
        kind: StreamKind,
        space_id: Option<StreamId>,
        properties: Option<ChannelProperties>,
    ) -> Result<Vec<Event>> {
        let signer = &self.inner.signer;
        let inception = make_event::<EventHash>(
            signer,
            Payload::Inception(Inception {
                stream_id: stream_id.clone(),
                kind,
                space_id,
                properties,
            }),
            &[],
        )?;
        let join = make_event(
            signer,
            Payload::Membership {
                op: MembershipOp::Join,
                user: self.user_id(),
            },
            &[inception.hash],
        )?;
        Ok(vec![inception, join])
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Start the sync loop. `timeout` overrides the configured long-poll
    /// timeout.
    pub async fn start_sync(&self, timeout: Option<Duration>) -> Result<()> {
        let mut sync = self.inner.sync.lock().await;
        if sync.is_some() {
            return Err(ClientError::SyncAlreadyStarted);
        }
        if self.inner.state.read().await.user_stream_id.is_none() {
            return Err(ClientError::UserStreamNotInitialized);
        }

        *self.inner.sync_error.lock().await = None;
        let id = self.inner.next_sync_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *sync = Some(SyncHandle {
            id,
            token: token.clone(),
        });

        let timeout = timeout.unwrap_or(self.inner.config.sync_timeout);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match Arc::clone(&inner).run_sync(timeout, token).await {
                Ok(()) => info!(sync_id = id, "sync stopped"),
                Err(error) => {
                    warn!(sync_id = id, %error, "sync loop ended");
                    *inner.sync_error.lock().await = Some(error);
                }
            }
            inner.clear_sync(id).await;
        });

        info!(sync_id = id, timeout_ms = timeout.as_millis() as u64, "sync started");
        Ok(())
    }

    /// Cancel the sync loop. Fails if no loop is running.
    pub async fn stop_sync(&self) -> Result<()> {
        let handle = self
            .inner
            .sync
            .lock()
            .await
            .take()
            .ok_or(ClientError::SyncNotStarted)?;
        handle.token.cancel();
        Ok(())
    }

    pub async fn stop_sync_if_started(&self) {
        if let Some(handle) = self.inner.sync.lock().await.take() {
            handle.token.cancel();
        }
    }

    /// Whether a sync loop is running.
    pub async fn is_syncing(&self) -> bool {
        self.inner.sync.lock().await.is_some()
    }

    /// Take the error that ended the last sync loop.
    ///
    /// `None` if the loop is still running, was stopped, or the error was
    /// already taken. Starting a new loop discards an untaken error.
    pub async fn take_sync_error(&self) -> Option<ClientError> {
        self.inner.sync_error.lock().await.take()
    }

    /// Stop syncing and drop every stream.
    pub async fn stop(&self) {
        self.stop_sync_if_started().await;
        let mut state = self.inner.state.write().await;
        state.streams.clear();
        state.user_stream_id = None;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `f` against a stream's view.
    pub async fn with_view<R>(
        &self,
        stream_id: &StreamId,
        f: impl FnOnce(&StreamStateView) -> R,
    ) -> Result<R> {
        let state = self.inner.state.read().await;
        let stream = state
            .streams
            .get(stream_id)
            .ok_or_else(|| ClientError::StreamNotFound(stream_id.clone()))?;
        Ok(f(stream.view()))
    }

    pub async fn leaf_frontier(&self, stream_id: &StreamId) -> Result<LeafFrontier> {
        self.with_view(stream_id, |view| view.leaf_frontier().clone())
            .await
    }

    pub async fn sync_cookie(&self, stream_id: &StreamId) -> Result<Option<SyncCookie>> {
        let state = self.inner.state.read().await;
        let stream = state
            .streams
            .get(stream_id)
            .ok_or_else(|| ClientError::StreamNotFound(stream_id.clone()))?;
        Ok(stream.sync_cookie().cloned())
    }

    pub async fn view_digest(&self, stream_id: &StreamId) -> Result<ViewDigest> {
        self.with_view(stream_id, view_digest).await
    }

    /// Ids of every stream held, sorted.
    pub async fn stream_ids(&self) -> Vec<StreamId> {
        let state = self.inner.state.read().await;
        let mut ids: Vec<_> = state.streams.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn has_stream(&self, stream_id: &StreamId) -> bool {
        self.inner.state.read().await.streams.contains_key(stream_id)
    }

    /// Wait until `stream_id` is held, or fail with [`ClientError::Timeout`].
    pub async fn wait_for_stream(&self, stream_id: &StreamId, timeout: Duration) -> Result<()> {
        let mut rx = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.has_stream(stream_id).await {
                return Ok(());
            }
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                    return Err(ClientError::Timeout)
                }
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Ok(mut sync) = self.inner.sync.try_lock() {
            if let Some(handle) = sync.take() {
                handle.token.cancel();
            }
        }
    }
}

impl Inner {
    fn publish(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            // No subscribers is fine.
            let _ = self.notifications.send(notification);
        }
    }

    /// Insert a fully loaded stream unless one is already held.
    async fn adopt(&self, slice: &StreamAndCookie) -> Result<()> {
        let (stream, notifications) =
            Stream::from_stream_and_cookie(slice, self.config.verify_events)?;
        {
            let mut state = self.state.write().await;
            if state.streams.contains_key(&slice.stream_id) {
                return Ok(());
            }
            state.streams.insert(slice.stream_id.clone(), stream);
        }
        self.publish(notifications);
        Ok(())
    }

    async fn init_stream(&self, stream_id: &StreamId) -> Result<()> {
        if self.state.read().await.streams.contains_key(stream_id) {
            return Ok(());
        }
        debug!(%stream_id, "get_event_stream");
        let response = self
            .rpc
            .get_event_stream(GetEventStreamRequest {
                stream_id: stream_id.clone(),
            })
            .await?;
        self.adopt(&response.stream).await
    }

    async fn sync_positions(&self) -> Vec<SyncPos> {
        let state = self.state.read().await;
        state
            .streams
            .iter()
            .filter_map(|(stream_id, stream)| {
                stream.sync_cookie().map(|cookie| SyncPos {
                    stream_id: stream_id.clone(),
                    sync_cookie: cookie.clone(),
                })
            })
            .collect()
    }

    async fn run_sync(self: Arc<Self>, timeout: Duration, token: CancellationToken) -> Result<()> {
        loop {
            if token.is_cancelled() {
                return Ok(());
            }
            let positions = self.sync_positions().await;
            debug!(streams = positions.len(), "sync_streams");

            let rpc = Arc::clone(&self.rpc);
            let request = SyncStreamsRequest { positions, timeout };
            // The call is detached so cancelling drops its result, not the request.
            let call = tokio::spawn(async move { rpc.sync_streams(request).await });

            let joined = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                joined = call => joined,
            };

            let response = match joined {
                Ok(Ok(response)) => response,
                Ok(Err(error)) => {
                    warn!(%error, "sync_streams failed, retrying");
                    if !self.pause(&token).await {
                        return Ok(());
                    }
                    continue;
                }
                Err(error) => {
                    warn!(%error, "sync_streams task failed, retrying");
                    if !self.pause(&token).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            let mut worklist = self.apply_sync(&response, &token).await?;
            while let Some(stream_id) = worklist.pop_front() {
                if token.is_cancelled() {
                    return Ok(());
                }
                if let Err(error) = self.init_stream(&stream_id).await {
                    warn!(%stream_id, %error, "failed to load joined stream");
                }
            }
        }
    }

    /// Sleep for the retry delay. Returns false if cancelled first.
    async fn pause(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(self.config.retry_delay) => true,
        }
    }

    /// Fold every known stream in `response`. Returns streams the user joined.
    ///
    /// Streams folded before a failing one keep their progress and their
    /// notifications are still published. Nothing is folded once `token` is
    /// cancelled.
    async fn apply_sync(
        &self,
        response: &SyncStreamsResponse,
        token: &CancellationToken,
    ) -> Result<VecDeque<StreamId>> {
        let mut notifications = Vec::new();
        let mut worklist = VecDeque::new();
        let mut failure = None;

        {
            let mut state = self.state.write().await;
            if token.is_cancelled() {
                debug!("sync cancelled, discarding batch");
                return Ok(worklist);
            }
            for (stream_id, slice) in &response.streams {
                let Some(stream) = state.streams.get_mut(stream_id) else {
                    debug!(%stream_id, "skipping unknown stream");
                    continue;
                };
                match stream.apply(slice, self.config.verify_events) {
                    Ok(folded) => notifications.extend(folded),
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }

            let user_stream_id = state.user_stream_id.clone();
            for notification in &notifications {
                match notification {
                    Notification::UserJoinedStream { stream_id, target }
                        if Some(stream_id) == user_stream_id.as_ref() =>
                    {
                        worklist.push_back(target.clone());
                    }
                    Notification::UserLeftStream { stream_id, target }
                        if Some(stream_id) == user_stream_id.as_ref() =>
                    {
                        worklist.retain(|id| id != target);
                        if state.streams.remove(target).is_some() {
                            info!(stream_id = %target, "left stream dropped");
                        }
                    }
                    _ => {}
                }
            }
        }

        self.publish(notifications);
        match failure {
            Some(error) => Err(error),
            None => Ok(worklist),
        }
    }

    async fn clear_sync(&self, id: u64) {
        let mut sync = self.sync.lock().await;
        if sync.as_ref().is_some_and(|handle| handle.id == id) {
            *sync = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weft_core::Wallet;
    use weft_sync::MemoryNode;

    fn signer(seed: u8) -> SignerContext {
        SignerContext::direct(Wallet::from_seed(&[seed; 32]).unwrap())
    }

    fn client(node: &Arc<MemoryNode>, seed: u8) -> Client {
        Client::new(signer(seed), Arc::clone(node), ClientConfig::default())
    }

    #[tokio::test]
    async fn test_stop_sync_before_start_fails() {
        let node = Arc::new(MemoryNode::new(Wallet::from_seed(&[9; 32]).unwrap()));
        let alice = client(&node, 1);
        assert!(matches!(
            alice.stop_sync().await,
            Err(ClientError::SyncNotStarted)
        ));
    }

    #[tokio::test]
    async fn test_start_sync_requires_user_stream() {
        let node = Arc::new(MemoryNode::new(Wallet::from_seed(&[9; 32]).unwrap()));
        let alice = client(&node, 1);
        assert!(matches!(
            alice.start_sync(None).await,
            Err(ClientError::UserStreamNotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_start_sync_twice_fails() {
        let node = Arc::new(MemoryNode::new(Wallet::from_seed(&[9; 32]).unwrap()));
        let alice = client(&node, 1);
        alice.create_new_user().await.unwrap();

        alice.start_sync(Some(Duration::from_millis(50))).await.unwrap();
        assert!(matches!(
            alice.start_sync(None).await,
            Err(ClientError::SyncAlreadyStarted)
        ));
        alice.stop_sync().await.unwrap();
        assert!(matches!(
            alice.stop_sync().await,
            Err(ClientError::SyncNotStarted)
        ));

        // restart after stop
        alice.start_sync(Some(Duration::from_millis(50))).await.unwrap();
        alice.stop_sync_if_started().await;
        alice.stop_sync_if_started().await;
        assert!(!alice.is_syncing().await);
        assert!(alice.take_sync_error().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_batch_is_discarded() {
        let node = Arc::new(MemoryNode::new(Wallet::from_seed(&[9; 32]).unwrap()));
        let alice = client(&node, 1);
        alice.create_new_user().await.unwrap();
        let space = alice.create_space(None, None).await.unwrap();

        let cookie = alice.sync_cookie(&space).await.unwrap().unwrap();
        let prevs = alice.leaf_frontier(&space).await.unwrap().hashes();
        let invite = make_event(
            &alice.inner.signer,
            Payload::Membership {
                op: MembershipOp::Invite,
                user: Wallet::from_seed(&[2; 32]).unwrap().address(),
            },
            &prevs,
        )
        .unwrap();
        let slice = StreamAndCookie {
            stream_id: space.clone(),
            events: vec![invite],
            sync_cookie: SyncCookie::new(space.clone(), cookie.position() + 1),
            original_sync_cookie: Some(cookie.clone()),
        };
        let response = SyncStreamsResponse {
            streams: BTreeMap::from([(space.clone(), slice)]),
        };

        let stopped = CancellationToken::new();
        stopped.cancel();
        let worklist = alice.inner.apply_sync(&response, &stopped).await.unwrap();
        assert!(worklist.is_empty());
        assert_eq!(alice.sync_cookie(&space).await.unwrap(), Some(cookie.clone()));

        // the same batch still folds for a live loop
        alice
            .inner
            .apply_sync(&response, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            alice.sync_cookie(&space).await.unwrap().map(|c| c.position()),
            Some(cookie.position() + 1)
        );
    }

    #[tokio::test]
    async fn test_create_space_holds_stream() {
        let node = Arc::new(MemoryNode::new(Wallet::from_seed(&[9; 32]).unwrap()));
        let alice = client(&node, 1);
        let user_stream = alice.create_new_user().await.unwrap();
        assert_eq!(alice.user_stream_id().await, Some(user_stream.clone()));

        let space = alice.create_space(None, None).await.unwrap();
        assert!(space.is_space());
        let joined = alice
            .with_view(&space, |view| view.is_joined(&alice.user_id()))
            .await
            .unwrap();
        assert!(joined);
        assert_eq!(alice.stream_ids().await.len(), 2);
        assert_eq!(
            alice.sync_cookie(&space).await.unwrap().map(|c| c.position()),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_unknown_stream_queries_fail() {
        let node = Arc::new(MemoryNode::new(Wallet::from_seed(&[9; 32]).unwrap()));
        let alice = client(&node, 1);
        let missing = StreamId::unique_channel();
        assert!(matches!(
            alice.leaf_frontier(&missing).await,
            Err(ClientError::StreamNotFound(_))
        ));
        assert!(matches!(
            alice.send_message(&missing, "hi").await,
            Err(ClientError::StreamNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_for_stream_times_out() {
        let node = Arc::new(MemoryNode::new(Wallet::from_seed(&[9; 32]).unwrap()));
        let alice = client(&node, 1);
        let result = alice
            .wait_for_stream(&StreamId::unique_space(), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(ClientError::Timeout)));
    }
}
