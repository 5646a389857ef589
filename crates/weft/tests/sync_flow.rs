//! End-to-end sync tests against an in-process node.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout_at, Instant};

use weft::core::{ChannelProperties, MembershipOp, Payload, Signature, StreamId, Wallet};
use weft::store::MemoryStore;
use weft::sync::{
    AddEventRequest, CreateStreamRequest, CreateUserRequest, GetEventStreamRequest, MemoryNode,
    NodeConfig, StreamResponse, StreamRpc, SyncCookie, SyncError, SyncStreamsRequest,
    SyncStreamsResponse,
};
use weft::view::rollup_stream;
use weft::{ClientError, Notification};
use weft_testkit::{init_tracing, TestUser};

const WAIT: Duration = Duration::from_secs(5);

fn node() -> Arc<MemoryNode> {
    Arc::new(MemoryNode::new(Wallet::generate()))
}

/// Receive until `pred` matches or [`WAIT`] passes.
async fn wait_for<F>(
    rx: &mut broadcast::Receiver<Notification>,
    mut pred: F,
) -> anyhow::Result<Notification>
where
    F: FnMut(&Notification) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let notification = timeout_at(deadline, rx.recv()).await??;
        if pred(&notification) {
            return Ok(notification);
        }
    }
}

fn joined(user_stream: &StreamId, target: &StreamId) -> impl Fn(&Notification) -> bool {
    let user_stream = user_stream.clone();
    let target = target.clone();
    move |n| {
        matches!(n, Notification::UserJoinedStream { stream_id, target: t }
            if *stream_id == user_stream && *t == target)
    }
}

fn message(text: &str) -> impl Fn(&Notification) -> bool + '_ {
    move |n| matches!(n, Notification::ChannelNewMessage { text: t, .. } if t == text)
}

#[test]
fn test_user_stream_rollup_and_join() {
    let alice = TestUser::new(1);
    let node = TestUser::new(99);
    let user_stream = alice.user_stream_id();

    let inception = alice.user_inception();
    let (mut view, notifications) = rollup_stream(&user_stream, &[inception.clone()]).unwrap();
    let inceptions = notifications
        .iter()
        .filter(|n| matches!(n, Notification::StreamInception { .. }))
        .count();
    assert_eq!(inceptions, 1);
    assert!(view.user_joined_streams().is_empty());

    let space = StreamId::unique_space();
    let join = node.event(
        Payload::UserMembership {
            op: MembershipOp::Join,
            stream_id: space.clone(),
        },
        &[inception.hash],
    );
    let notifications = view.add_events(&[join]).unwrap();
    assert_eq!(
        notifications[0],
        Notification::UserJoinedStream {
            stream_id: user_stream.clone(),
            target: space.clone(),
        }
    );
    assert!(view.user_joined_streams().contains(&space));
}

#[tokio::test]
async fn test_stop_sync_before_start_fails() {
    let alice = TestUser::new(1).client(node());
    assert!(matches!(
        alice.stop_sync().await,
        Err(ClientError::SyncNotStarted)
    ));
}

#[tokio::test]
async fn test_sync_batch_only_touches_its_stream() -> anyhow::Result<()> {
    init_tracing();
    let node = node();
    let alice = TestUser::new(1).client(Arc::clone(&node));
    let bob = TestUser::new(2);
    let mut rx = alice.subscribe();

    let user_stream = alice.create_new_user().await?;
    let space = alice.create_space(None, None).await?;
    alice.start_sync(None).await?;

    // the node's join record reaches the user stream first
    wait_for(&mut rx, joined(&user_stream, &space)).await?;
    let user_cookie = alice.sync_cookie(&user_stream).await?;
    let space_cookie = alice.sync_cookie(&space).await?;
    assert_eq!(user_cookie.as_ref().map(SyncCookie::position), Some(2));
    assert_eq!(space_cookie.as_ref().map(SyncCookie::position), Some(2));
    let user_digest = alice.view_digest(&user_stream).await?;

    alice.invite_user(&space, bob.address()).await?;
    wait_for(&mut rx, |n| {
        matches!(n, Notification::StreamNewUserInvited { stream_id, .. } if *stream_id == space)
    })
    .await?;

    assert_eq!(
        alice.sync_cookie(&space).await?.map(|c| c.position()),
        Some(3)
    );
    assert_eq!(alice.sync_cookie(&user_stream).await?, user_cookie);
    assert_eq!(alice.view_digest(&user_stream).await?, user_digest);
    let invited = alice
        .with_view(&space, |view| view.invited_users().contains(&bob.address()))
        .await?;
    assert!(invited);

    alice.stop_sync().await?;
    Ok(())
}

#[tokio::test]
async fn test_two_clients_converge_on_channel() -> anyhow::Result<()> {
    init_tracing();
    let node = node();
    let alice_user = TestUser::new(1);
    let bob_user = TestUser::new(2);
    let alice = alice_user.client(Arc::clone(&node));
    let bob = bob_user.client(Arc::clone(&node));
    let mut alice_rx = alice.subscribe();
    let mut bob_rx = bob.subscribe();

    alice.create_new_user().await?;
    let bob_stream = bob.create_new_user().await?;
    alice.start_sync(None).await?;
    bob.start_sync(None).await?;

    let space = alice.create_space(None, None).await?;
    alice.invite_user(&space, bob_user.address()).await?;
    wait_for(&mut bob_rx, |n| {
        matches!(n, Notification::UserInvitedToStream { stream_id, target }
            if *stream_id == bob_stream && *target == space)
    })
    .await?;

    bob.join_stream(&space).await?;
    wait_for(&mut alice_rx, |n| {
        matches!(n, Notification::StreamNewUserJoined { stream_id, user }
            if *stream_id == space && *user == bob_user.address())
    })
    .await?;

    let properties = ChannelProperties {
        name: "general".into(),
        topic: "anything".into(),
    };
    let channel = alice.create_channel(&space, None, properties.clone()).await?;
    let created = wait_for(&mut bob_rx, |n| {
        matches!(
            n,
            Notification::SpaceNewChannelCreated { channel_id, .. } if *channel_id == channel
        )
    })
    .await?;
    assert_eq!(
        created,
        Notification::SpaceNewChannelCreated {
            space_id: space.clone(),
            channel_id: channel.clone(),
            properties,
        }
    );

    bob.join_stream(&channel).await?;
    bob.send_message(&channel, "hi alice").await?;
    wait_for(&mut alice_rx, message("hi alice")).await?;
    wait_for(&mut bob_rx, message("hi alice")).await?;

    assert_eq!(
        alice.view_digest(&channel).await?,
        bob.view_digest(&channel).await?
    );
    let members = alice
        .with_view(&channel, |view| view.joined_users().len())
        .await?;
    assert_eq!(members, 2);

    alice.stop().await;
    bob.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_second_device_loads_joined_streams() -> anyhow::Result<()> {
    init_tracing();
    let node = node();
    let user = TestUser::new(1);
    let first = user.client(Arc::clone(&node));
    first.create_new_user().await?;
    let space = first.create_space(None, None).await?;

    let second = user.client(Arc::clone(&node));
    second.load_existing_user().await?;
    assert!(second.has_stream(&space).await);

    second.start_sync(None).await?;
    let later = first.create_space(None, None).await?;
    second.wait_for_stream(&later, WAIT).await?;
    assert_eq!(second.stream_ids().await.len(), 3);

    second.stop_sync().await?;
    Ok(())
}

#[tokio::test]
async fn test_leaving_drops_stream() -> anyhow::Result<()> {
    init_tracing();
    let node = node();
    let alice = TestUser::new(1).client(Arc::clone(&node));
    let mut rx = alice.subscribe();

    let user_stream = alice.create_new_user().await?;
    let space = alice.create_space(None, None).await?;
    let channel = alice
        .create_channel(&space, None, ChannelProperties::default())
        .await?;
    alice.start_sync(None).await?;
    wait_for(&mut rx, joined(&user_stream, &channel)).await?;

    alice.leave_stream(&channel).await?;
    wait_for(&mut rx, |n| {
        matches!(n, Notification::UserLeftStream { target, .. } if *target == channel)
    })
    .await?;

    assert!(!alice.has_stream(&channel).await);
    assert!(alice.has_stream(&space).await);
    assert!(matches!(
        alice.send_message(&channel, "still here?").await,
        Err(ClientError::StreamNotFound(_))
    ));

    alice.stop_sync().await?;
    Ok(())
}

#[tokio::test]
async fn test_forged_event_is_dropped() -> anyhow::Result<()> {
    init_tracing();
    let node = Arc::new(MemoryNode::with_store(
        Wallet::generate(),
        MemoryStore::new(),
        NodeConfig {
            verify_events: false,
            ..NodeConfig::default()
        },
    ));
    let alice_user = TestUser::new(1);
    let alice = alice_user.client(Arc::clone(&node));
    let mut rx = alice.subscribe();

    alice.create_new_user().await?;
    let space = alice.create_space(None, None).await?;
    let channel = alice
        .create_channel(&space, None, ChannelProperties::default())
        .await?;
    alice.start_sync(None).await?;

    let prevs = alice.leaf_frontier(&channel).await?.hashes();
    let mut forged = alice_user.message("forged", &prevs);
    forged.signature = Signature::ZERO;
    node.add_event(AddEventRequest {
        stream_id: channel.clone(),
        event: forged,
    })
    .await?;

    alice.send_message(&channel, "real").await?;
    wait_for(&mut rx, message("real")).await?;

    let texts = alice
        .with_view(&channel, |view| {
            view.messages_in_order()
                .map(|m| m.text.clone())
                .collect::<Vec<_>>()
        })
        .await?;
    assert_eq!(texts, vec!["real".to_string()]);

    alice.stop_sync().await?;
    Ok(())
}

#[tokio::test]
async fn test_delegated_client() -> anyhow::Result<()> {
    let node = node();
    let alice = TestUser::delegated(1, i64::MAX).client(Arc::clone(&node));
    let user_stream = alice.create_new_user().await?;
    assert_eq!(user_stream, StreamId::for_user(&TestUser::new(1).address()));

    let space = alice.create_space(None, None).await?;
    let joined = alice
        .with_view(&space, |view| view.is_joined(&TestUser::new(1).address()))
        .await?;
    assert!(joined);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Misbehaving transports
// ─────────────────────────────────────────────────────────────────────────────

/// Passes calls through to a node, optionally breaking `sync_streams`.
struct Faulty {
    node: Arc<MemoryNode>,
    /// Number of sync calls left to fail.
    failures: AtomicUsize,
    /// Rewrite the continuation cookie of every returned slice.
    corrupt_cookies: bool,
}

impl Faulty {
    fn new(node: Arc<MemoryNode>, failures: usize, corrupt_cookies: bool) -> Self {
        Self {
            node,
            failures: AtomicUsize::new(failures),
            corrupt_cookies,
        }
    }
}

#[async_trait]
impl StreamRpc for Faulty {
    async fn create_user(&self, request: CreateUserRequest) -> weft::sync::Result<StreamResponse> {
        self.node.create_user(request).await
    }

    async fn get_event_stream(
        &self,
        request: GetEventStreamRequest,
    ) -> weft::sync::Result<StreamResponse> {
        self.node.get_event_stream(request).await
    }

    async fn create_space(
        &self,
        request: CreateStreamRequest,
    ) -> weft::sync::Result<StreamResponse> {
        self.node.create_space(request).await
    }

    async fn create_channel(
        &self,
        request: CreateStreamRequest,
    ) -> weft::sync::Result<StreamResponse> {
        self.node.create_channel(request).await
    }

    async fn add_event(&self, request: AddEventRequest) -> weft::sync::Result<()> {
        self.node.add_event(request).await
    }

    async fn sync_streams(
        &self,
        request: SyncStreamsRequest,
    ) -> weft::sync::Result<SyncStreamsResponse> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::Transport("connection reset".into()));
        }

        let mut response = self.node.sync_streams(request).await?;
        if self.corrupt_cookies {
            for (stream_id, slice) in response.streams.iter_mut() {
                slice.original_sync_cookie = Some(SyncCookie::new(stream_id.clone(), 999));
            }
        }
        Ok(response)
    }
}

#[tokio::test]
async fn test_sync_retries_after_rpc_failure() -> anyhow::Result<()> {
    init_tracing();
    let faulty = Arc::new(Faulty::new(node(), 3, false));
    let alice = TestUser::new(1).client(Arc::clone(&faulty));
    let mut rx = alice.subscribe();

    let user_stream = alice.create_new_user().await?;
    alice.start_sync(None).await?;
    let space = alice.create_space(None, None).await?;

    wait_for(&mut rx, joined(&user_stream, &space)).await?;
    assert_eq!(faulty.failures.load(Ordering::SeqCst), 0);
    assert!(alice.is_syncing().await);

    alice.stop_sync().await?;
    Ok(())
}

#[tokio::test]
async fn test_cookie_mismatch_ends_sync() -> anyhow::Result<()> {
    init_tracing();
    let faulty = Arc::new(Faulty::new(node(), 0, true));
    let alice = TestUser::new(1).client(Arc::clone(&faulty));

    let user_stream = alice.create_new_user().await?;
    let before = alice.sync_cookie(&user_stream).await?;
    alice.start_sync(None).await?;
    alice.create_space(None, None).await?;

    let deadline = Instant::now() + WAIT;
    while alice.is_syncing().await {
        assert!(Instant::now() < deadline, "sync loop did not stop");
        sleep(Duration::from_millis(10)).await;
    }

    assert!(matches!(
        alice.take_sync_error().await,
        Some(ClientError::SyncCookieMismatch { .. })
    ));
    assert!(alice.take_sync_error().await.is_none());

    // the rejected slice left the cookie alone
    assert_eq!(alice.sync_cookie(&user_stream).await?, before);
    assert!(matches!(
        alice.stop_sync().await,
        Err(ClientError::SyncNotStarted)
    ));
    Ok(())
}
