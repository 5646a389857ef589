//! In-memory implementation of the EventStore trait.
//!
//! All data is lost when the store is dropped.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use weft_core::{Event, EventHash, StreamId};

use crate::error::{Result, StoreError};
use crate::traits::{EventStore, InsertResult};

/// In-memory store implementation.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Stream logs in append order.
    streams: HashMap<StreamId, Vec<Event>>,

    /// Hash index: (stream_id, hash) -> position in the log.
    positions: HashMap<(StreamId, EventHash), usize>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn push(&mut self, stream_id: &StreamId, event: &Event) -> InsertResult {
        let key = (stream_id.clone(), event.hash);
        if self.positions.contains_key(&key) {
            return InsertResult::AlreadyExists;
        }
        let log = self.streams.entry(stream_id.clone()).or_default();
        self.positions.insert(key, log.len());
        log.push(event.clone());
        InsertResult::Inserted
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_stream(&self, stream_id: &StreamId, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Err(StoreError::InvalidData(format!(
                "stream {stream_id} created without events"
            )));
        }

        let mut inner = self.inner.write().await;
        if inner.streams.contains_key(stream_id) {
            return Err(StoreError::StreamExists(stream_id.clone()));
        }
        for event in events {
            inner.push(stream_id, event);
        }
        debug!(%stream_id, events = events.len(), "stream created");
        Ok(())
    }

    async fn get_stream(&self, stream_id: &StreamId) -> Result<Option<Vec<Event>>> {
        let inner = self.inner.read().await;
        Ok(inner.streams.get(stream_id).cloned())
    }

    async fn stream_len(&self, stream_id: &StreamId) -> Result<Option<u64>> {
        let inner = self.inner.read().await;
        Ok(inner.streams.get(stream_id).map(|log| log.len() as u64))
    }

    async fn list_streams(&self) -> Result<Vec<StreamId>> {
        let inner = self.inner.read().await;
        let mut ids: Vec<StreamId> = inner.streams.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn append_event(&self, stream_id: &StreamId, event: &Event) -> Result<InsertResult> {
        let mut inner = self.inner.write().await;
        if !inner.streams.contains_key(stream_id) {
            return Err(StoreError::StreamNotFound(stream_id.clone()));
        }
        Ok(inner.push(stream_id, event))
    }

    async fn get_event(&self, stream_id: &StreamId, hash: &EventHash) -> Result<Option<Event>> {
        let inner = self.inner.read().await;
        let event = inner
            .positions
            .get(&(stream_id.clone(), *hash))
            .and_then(|&pos| inner.streams.get(stream_id).and_then(|log| log.get(pos)))
            .cloned();
        Ok(event)
    }

    async fn has_event(&self, stream_id: &StreamId, hash: &EventHash) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.positions.contains_key(&(stream_id.clone(), *hash)))
    }

    async fn events_since(&self, stream_id: &StreamId, position: u64) -> Result<Vec<Event>> {
        let inner = self.inner.read().await;
        let log = inner
            .streams
            .get(stream_id)
            .ok_or_else(|| StoreError::StreamNotFound(stream_id.clone()))?;
        let start = usize::try_from(position).unwrap_or(usize::MAX).min(log.len());
        Ok(log[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{make_event, Inception, Payload, SignerContext, StreamKind, Wallet};

    fn ctx() -> SignerContext {
        SignerContext::direct(Wallet::from_seed(&[0x42; 32]).unwrap())
    }

    fn inception(stream_id: &StreamId) -> Event {
        let payload = Payload::Inception(Inception {
            stream_id: stream_id.clone(),
            kind: StreamKind::Space,
            space_id: None,
            properties: None,
        });
        make_event::<EventHash>(&ctx(), payload, &[]).unwrap()
    }

    fn message(prev: EventHash) -> Event {
        make_event(&ctx(), Payload::Message { text: "m".into() }, &[prev]).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let stream_id = StreamId::unique_space();
        let first = inception(&stream_id);

        store.create_stream(&stream_id, &[first.clone()]).await.unwrap();

        let got = store.get_event(&stream_id, &first.hash).await.unwrap().unwrap();
        assert_eq!(got, first);
        assert_eq!(store.stream_len(&stream_id).await.unwrap(), Some(1));
        assert_eq!(store.list_streams().await.unwrap(), vec![stream_id]);
    }

    #[tokio::test]
    async fn test_memory_store_idempotent() {
        let store = MemoryStore::new();
        let stream_id = StreamId::unique_space();
        let first = inception(&stream_id);
        store.create_stream(&stream_id, &[first.clone()]).await.unwrap();

        let next = message(first.hash);
        let r1 = store.append_event(&stream_id, &next).await.unwrap();
        assert_eq!(r1, InsertResult::Inserted);

        let r2 = store.append_event(&stream_id, &next).await.unwrap();
        assert_eq!(r2, InsertResult::AlreadyExists);
        assert_eq!(store.stream_len(&stream_id).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_events_since_position() {
        let store = MemoryStore::new();
        let stream_id = StreamId::unique_space();
        let first = inception(&stream_id);
        store.create_stream(&stream_id, &[first.clone()]).await.unwrap();

        let a = message(first.hash);
        let b = message(a.hash);
        store.append_event(&stream_id, &a).await.unwrap();
        store.append_event(&stream_id, &b).await.unwrap();

        let since = store.events_since(&stream_id, 1).await.unwrap();
        assert_eq!(since, vec![a, b.clone()]);
        assert_eq!(store.events_since(&stream_id, 2).await.unwrap(), vec![b]);
        assert!(store.events_since(&stream_id, 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_errors() {
        let store = MemoryStore::new();
        let stream_id = StreamId::unique_space();
        let first = inception(&stream_id);

        assert!(matches!(
            store.append_event(&stream_id, &first).await,
            Err(StoreError::StreamNotFound(_))
        ));
        store.create_stream(&stream_id, &[first.clone()]).await.unwrap();
        assert!(matches!(
            store.create_stream(&stream_id, &[first]).await,
            Err(StoreError::StreamExists(_))
        ));
        assert!(matches!(
            store.create_stream(&StreamId::unique_space(), &[]).await,
            Err(StoreError::InvalidData(_))
        ));
    }
}
