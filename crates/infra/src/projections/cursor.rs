use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value as JsonValue;
use thiserror::Error;

use gescom_core::{AggregateId, TenantId};
use gescom_events::EventEnvelope;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// The envelope is ahead of the cursor; earlier events of the stream are missing.
    #[error("sequence gap in {aggregate_type}/{aggregate_id} (last={last}, found={found})")]
    Gap {
        aggregate_type: String,
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    /// The event decoded but could not be folded into the read model.
    #[error("invalid read model update: {0}")]
    Invalid(String),

    /// Reloading a stream to close a gap failed.
    #[error("event store error during catch-up: {0}")]
    Store(String),
}

/// Whether an envelope changed the read model.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// At or below the cursor: a redelivery.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_type: String,
    aggregate_id: AggregateId,
}

/// Per-stream cursors for an idempotent projection.
///
/// Streams start at 1 and are applied strictly in order: redeliveries at or
/// below the cursor are skipped, anything past `last + 1` is a [`ProjectionError::Gap`].
/// The update closure runs while the cursor lock is held, so two threads can
/// never apply the same stream concurrently.
#[derive(Debug, Default)]
pub struct StreamCursors {
    cursors: Mutex<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        update: impl FnOnce() -> Result<(), ProjectionError>,
    ) -> Result<Applied, ProjectionError> {
        let seq = envelope.sequence_number();
        let key = CursorKey {
            tenant_id: envelope.tenant_id(),
            aggregate_type: envelope.aggregate_type().to_string(),
            aggregate_id: envelope.aggregate_id(),
        };

        let mut cursors = self
            .cursors
            .lock()
            .map_err(|_| ProjectionError::Invalid("cursor lock poisoned".to_string()))?;
        let last = cursors.get(&key).copied().unwrap_or(0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(Applied::Skipped);
        }
        if seq != last + 1 {
            return Err(ProjectionError::Gap {
                aggregate_type: key.aggregate_type,
                aggregate_id: key.aggregate_id,
                last,
                found: seq,
            });
        }

        update()?;
        cursors.insert(key, seq);
        Ok(Applied::Applied)
    }

    pub fn position(&self, tenant_id: TenantId, aggregate_type: &str, aggregate_id: AggregateId) -> u64 {
        let key = CursorKey {
            tenant_id,
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
        };
        self.cursors
            .lock()
            .ok()
            .and_then(|c| c.get(&key).copied())
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        if let Ok(mut cursors) = self.cursors.lock() {
            cursors.clear();
        }
    }
}

/// Decode an envelope payload and check it belongs to the envelope's tenant.
pub(crate) fn decode<E>(
    envelope: &EventEnvelope<JsonValue>,
    event_tenant: impl FnOnce(&E) -> TenantId,
) -> Result<E, ProjectionError>
where
    E: serde::de::DeserializeOwned,
{
    let event: E = serde_json::from_value(envelope.payload().clone())
        .map_err(|e| ProjectionError::Deserialize(format!("{}: {e}", envelope.event_type())))?;

    if event_tenant(&event) != envelope.tenant_id() {
        return Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    Ok(event)
}
