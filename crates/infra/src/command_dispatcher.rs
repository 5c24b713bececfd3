//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant + aggregate type + id)
//!   ↓
//! 2. Rehydrate aggregate
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Append (optimistic concurrency check, one or several streams atomically)
//!   ↓
//! 5. Publish committed events to the bus (best effort)
//! ```
//!
//! Single-aggregate commands go through [`CommandDispatcher::dispatch`]. Workflows
//! that touch several aggregates load each one with [`CommandDispatcher::load`],
//! decide in memory, collect the events in a [`UnitOfWork`] and
//! [`commit`](CommandDispatcher::commit) it as one batch.
//!
//! Optimistic concurrency conflicts are retried (fresh load, fresh decision) up to
//! `max_retries` times. Nothing else is retried.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use gescom_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use gescom_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// Retries after the first attempt when an append hits a concurrency conflict.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Business rule failure (deterministic, never retried).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency failure that survived every retry.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// Tenant isolation violation (cross-tenant or cross-aggregate stream mixing).
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    /// Persisting to (or loading from) the event store failed.
    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

/// An aggregate rehydrated from its stream, with the version it was loaded at.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub aggregate: A,
    pub version: u64,
}

/// Events decided for several streams, committed together.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    appends: Vec<StreamAppend>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `events` for one stream, expecting it to still be at `loaded_version`.
    pub fn record<E>(
        &mut self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        loaded_version: u64,
        events: &[E],
    ) -> Result<(), DispatchError>
    where
        E: gescom_events::Event + Serialize,
    {
        if events.is_empty() {
            return Ok(());
        }

        let uncommitted = events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(tenant_id, aggregate_id, aggregate_type, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.appends.push(StreamAppend::new(
            uncommitted,
            ExpectedVersion::Exact(loaded_version),
        ));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.appends.iter().all(|a| a.events.is_empty())
    }

    pub fn stream_count(&self) -> usize {
        self.appends.len()
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and the bus so tests run on the in-memory pair and
/// the server can swap in Postgres without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    max_retries: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate one aggregate.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Loaded<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_type, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;

        Ok(Loaded {
            aggregate,
            version: stream_version(&history),
        })
    }

    /// Append a unit of work atomically, then publish what was committed.
    ///
    /// Once the append succeeds the events are durable: a bus failure is logged
    /// and the committed events are still returned so callers project them.
    pub fn commit(&self, unit: UnitOfWork) -> Result<Vec<StoredEvent>, DispatchError> {
        if unit.is_empty() {
            return Ok(vec![]);
        }

        let streams = unit.stream_count();
        let committed = self.store.append_batch(unit.appends)?;
        debug!(streams, events = committed.len(), "unit of work committed");

        for stored in &committed {
            if let Err(e) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    error = ?e,
                    "event committed but not published"
                );
            }
        }

        Ok(committed)
    }

    /// Run `attempt` until it stops failing with a concurrency conflict.
    ///
    /// Each attempt must reload everything it decides on.
    pub fn with_retry<T>(
        &self,
        operation: &str,
        mut attempt: impl FnMut() -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(DispatchError::Concurrency(msg)) if retries < self.max_retries => {
                    retries += 1;
                    warn!(operation, retries, reason = %msg, "concurrency conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Load, decide and append a command against a single aggregate, with retries.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: gescom_events::Event + Serialize + DeserializeOwned,
    {
        self.with_retry(aggregate_type, || {
            let loaded = self.load(tenant_id, aggregate_type, aggregate_id, &make_aggregate)?;
            let decided = loaded.aggregate.handle(&command)?;
            if decided.is_empty() {
                return Ok(vec![]);
            }

            let mut unit = UnitOfWork::new();
            unit.record(tenant_id, aggregate_type, aggregate_id, loaded.version, &decided)?;
            self.commit(unit)
        })
    }
}

/// Decode a stored payload into a typed domain event.
pub fn decode_event<E: DeserializeOwned>(stored: &StoredEvent) -> Result<E, DispatchError> {
    serde_json::from_value(stored.payload.clone()).map_err(|e| {
        DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type, stored.sequence_number))
    })
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A buggy backend must not leak another tenant's history into a decision.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = decode_event(stored)?;
        aggregate.apply(&ev);
    }
    Ok(())
}
