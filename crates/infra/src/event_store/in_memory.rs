use std::collections::HashMap;
use std::sync::RwLock;

use gescom_core::{AggregateId, TenantId};

use super::r#trait::{
    batch_keys, EventStore, EventStoreError, StoredEvent, StreamAppend, StreamKey,
};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Commit-ordered log of every stored event.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev and the single-node server. A batch is checked and
/// written under one write lock, so readers never observe half of it.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Backend("lock poisoned".to_string())
    }
}

impl EventStore for InMemoryEventStore {
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let keys = batch_keys(&batch)?;
        if keys.is_empty() {
            return Ok(vec![]);
        }

        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;

        // Check every stream before writing anything.
        let mut starts = Vec::with_capacity(keys.len());
        for (idx, key) in &keys {
            let current = inner
                .streams
                .get(key)
                .map(|s| Self::current_version(s))
                .unwrap_or(0);
            let expected = batch[*idx].expected_version;
            if !expected.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "{}/{}: expected {expected:?}, found {current}",
                    key.aggregate_type, key.aggregate_id
                )));
            }
            starts.push(current);
        }

        let mut committed = Vec::new();
        let mut batch: Vec<Option<StreamAppend>> = batch.into_iter().map(Some).collect();
        for ((idx, key), current) in keys.into_iter().zip(starts) {
            let Some(append) = batch[idx].take() else {
                continue;
            };

            let mut next = current + 1;
            let mut stored_events = Vec::with_capacity(append.events.len());
            for e in append.events {
                stored_events.push(StoredEvent {
                    event_id: e.event_id,
                    tenant_id: e.tenant_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                });
                next += 1;
            }

            inner.log.extend(stored_events.iter().cloned());
            inner
                .streams
                .entry(key)
                .or_default()
                .extend(stored_events.iter().cloned());
            committed.extend(stored_events);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
        };

        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.log.clone())
    }
}
