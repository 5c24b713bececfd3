use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use gescom_core::{AggregateId, ExpectedVersion, TenantId};
use gescom_events::{EnvelopeMeta, EventEnvelope};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Lifecycle:
///
/// 1. **Domain event**: returned by an aggregate's `handle()`
/// 2. **UncommittedEvent**: serialized payload plus stream metadata
/// 3. **StoredEvent**: persisted, with its `sequence_number`
/// 4. **EventEnvelope**: published on the bus for projections and workers
///
/// Build one with [`UncommittedEvent::from_typed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers are scoped to the `(tenant_id, aggregate_type, aggregate_id)`
/// stream, start at 1 and never have gaps. A product's catalog stream and its
/// stock ledger stream share the aggregate id but are numbered independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a tenant-scoped event envelope for publication.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            EnvelopeMeta {
                event_id: self.event_id,
                tenant_id: self.tenant_id,
                aggregate_id: self.aggregate_id,
                aggregate_type: self.aggregate_type.clone(),
                sequence_number: self.sequence_number,
                event_type: self.event_type.clone(),
                occurred_at: self.occurred_at,
            },
            self.payload.clone(),
        )
    }
}

/// One stream's share of an atomic append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub events: Vec<UncommittedEvent>,
    pub expected_version: ExpectedVersion,
}

impl StreamAppend {
    pub fn new(events: Vec<UncommittedEvent>, expected_version: ExpectedVersion) -> Self {
        Self {
            events,
            expected_version,
        }
    }

    /// Stream key of the first event, after checking every event shares it.
    pub(crate) fn stream_key(&self) -> Result<Option<StreamKey>, EventStoreError> {
        let Some(first) = self.events.first() else {
            return Ok(None);
        };

        for (idx, e) in self.events.iter().enumerate() {
            if e.tenant_id != first.tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "append contains multiple tenant_ids (index {idx})"
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "append contains multiple aggregate_types (index {idx})"
                )));
            }
            if e.aggregate_id != first.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "append contains multiple aggregate_ids (index {idx})"
                )));
            }
        }

        Ok(Some(StreamKey {
            tenant_id: first.tenant_id,
            aggregate_type: first.aggregate_type.clone(),
            aggregate_id: first.aggregate_id,
        }))
    }
}

/// Identity of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub tenant_id: TenantId,
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
}

impl StreamKey {
    /// Total order used to take row locks in a deterministic sequence.
    pub fn lock_order(&self) -> (uuid::Uuid, &str, AggregateId) {
        (*self.tenant_id.as_uuid(), self.aggregate_type.as_str(), self.aggregate_id)
    }
}

/// Validate a batch and return its stream keys, in batch order.
///
/// Empty appends are dropped; the same stream may not appear twice and a batch
/// never spans tenants.
pub(crate) fn batch_keys(
    batch: &[StreamAppend],
) -> Result<Vec<(usize, StreamKey)>, EventStoreError> {
    let mut keys: Vec<(usize, StreamKey)> = Vec::with_capacity(batch.len());
    for (idx, append) in batch.iter().enumerate() {
        let Some(key) = append.stream_key()? else {
            continue;
        };
        if keys.iter().any(|(_, k)| k.tenant_id != key.tenant_id) {
            return Err(EventStoreError::TenantIsolation(
                "batch spans multiple tenants".to_string(),
            ));
        }
        if keys.iter().any(|(_, k)| *k == key) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {}/{} appears twice in one batch",
                key.aggregate_type, key.aggregate_id
            )));
        }
        keys.push((idx, key));
    }
    Ok(keys)
}

/// Event store operation error.
///
/// Infrastructure failures (storage, concurrency, isolation) as opposed to domain
/// errors (validation, invariants).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// The storage backend failed (connection, query, lock poisoning).
    #[error("event store backend failure: {0}")]
    Backend(String),
}

/// Append-only, tenant-scoped event store.
///
/// Events live in **streams** keyed by `(tenant_id, aggregate_type, aggregate_id)`,
/// with sequence numbers 1, 2, 3, ... inside each stream.
///
/// `append_batch()` is the only write primitive:
/// - every append in the batch is validated (one tenant, type and id per append)
/// - every expected version is checked before anything is written
/// - either all streams are extended or none is
///
/// `load_stream()` returns a stream in sequence order (empty if it does not exist).
/// `load_all()` returns every committed event in commit order and is used to
/// rebuild read models at startup.
pub trait EventStore: Send + Sync {
    /// Append to several streams atomically.
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Append events to a single stream.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.append_batch(vec![StreamAppend::new(events, expected_version)])
    }

    /// Load the full stream for a tenant + aggregate.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every committed event, all tenants, in commit order.
    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append_batch(batch)
    }

    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_type, aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all()
    }
}

impl UncommittedEvent {
    /// Build from a typed domain event, capturing the metadata needed to decode it later.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: gescom_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
