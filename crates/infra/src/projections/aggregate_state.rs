use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use gescom_core::{Aggregate, AggregateId, DomainError, TenantId};
use gescom_events::EventEnvelope;

use super::cursor::{decode, Applied, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Events that name their tenant and the aggregate they belong to.
pub trait StreamEvent {
    fn tenant_id(&self) -> gescom_core::TenantId;
    fn aggregate_id(&self) -> AggregateId;
}

impl StreamEvent for gescom_clients::ClientEvent {
    fn tenant_id(&self) -> TenantId {
        gescom_clients::ClientEvent::tenant_id(self)
    }

    fn aggregate_id(&self) -> AggregateId {
        self.client_id().aggregate_id()
    }
}

impl StreamEvent for gescom_sales::SalesOrderEvent {
    fn tenant_id(&self) -> TenantId {
        gescom_sales::SalesOrderEvent::tenant_id(self)
    }

    fn aggregate_id(&self) -> AggregateId {
        self.order_id().aggregate_id()
    }
}

impl StreamEvent for gescom_sales::DeliveryEvent {
    fn tenant_id(&self) -> TenantId {
        gescom_sales::DeliveryEvent::tenant_id(self)
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            gescom_sales::DeliveryEvent::DeliveryRecorded(e) => e.delivery_id.aggregate_id(),
        }
    }
}

impl StreamEvent for gescom_invoicing::InvoiceEvent {
    fn tenant_id(&self) -> TenantId {
        gescom_invoicing::InvoiceEvent::tenant_id(self)
    }

    fn aggregate_id(&self) -> AggregateId {
        self.invoice_id().aggregate_id()
    }
}

/// Latest aggregate state and the view derived from it.
#[derive(Debug, Clone)]
pub struct StateEntry<A, V> {
    pub aggregate: A,
    pub view: V,
}

/// Read model that folds each stream into the aggregate itself and keeps a
/// serializable view next to it.
///
/// Used where the read side needs the same derived values as the write side
/// (order totals, invoice status), so they are computed by the domain code
/// rather than duplicated in the projection.
pub struct AggregateStateProjection<A, V> {
    aggregate_type: &'static str,
    make: fn(AggregateId) -> A,
    view: fn(&A) -> Result<V, DomainError>,
    store: InMemoryTenantStore<AggregateId, StateEntry<A, V>>,
    cursors: StreamCursors,
}

impl<A, V> core::fmt::Debug for AggregateStateProjection<A, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AggregateStateProjection")
            .field("aggregate_type", &self.aggregate_type)
            .finish_non_exhaustive()
    }
}

impl<A, V> AggregateStateProjection<A, V>
where
    A: Aggregate + Clone + Send + Sync + 'static,
    A::Event: DeserializeOwned + StreamEvent,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        aggregate_type: &'static str,
        make: fn(AggregateId) -> A,
        view: fn(&A) -> Result<V, DomainError>,
    ) -> Self {
        Self {
            aggregate_type,
            make,
            view,
            store: InMemoryTenantStore::new(),
            cursors: StreamCursors::new(),
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn get(&self, tenant_id: TenantId, id: AggregateId) -> Option<StateEntry<A, V>> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<StateEntry<A, V>> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        self.cursors.apply(envelope, || {
            let event: A::Event = decode(envelope, StreamEvent::tenant_id)?;
            let id = event.aggregate_id();
            if id != envelope.aggregate_id() {
                return Err(ProjectionError::TenantIsolation(
                    "event aggregate id does not match envelope aggregate_id".to_string(),
                ));
            }

            let tenant_id = envelope.tenant_id();
            let mut aggregate = self
                .store
                .get(tenant_id, &id)
                .map(|entry| entry.aggregate)
                .unwrap_or_else(|| (self.make)(id));
            aggregate.apply(&event);

            let view = (self.view)(&aggregate).map_err(|e| ProjectionError::Invalid(e.to_string()))?;
            self.store.upsert(tenant_id, id, StateEntry { aggregate, view });
            Ok(())
        })
    }

    pub fn reset(&self) {
        self.cursors.reset();
        self.store.clear_all();
    }
}
