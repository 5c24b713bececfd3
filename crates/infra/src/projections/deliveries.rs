use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use gescom_core::{DomainError, TenantId, UserId};
use gescom_events::EventEnvelope;
use gescom_sales::{Delivery, DeliveryId, DeliveryLine, SalesOrderId};

use super::aggregate_state::AggregateStateProjection;
use super::cursor::{Applied, ProjectionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryView {
    pub delivery_id: DeliveryId,
    pub delivery_number: String,
    pub order_id: Option<SalesOrderId>,
    pub lines: Vec<DeliveryLine>,
    pub delivery_address: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub delivered_by: Option<UserId>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryView {
    fn from_delivery(delivery: &Delivery) -> Result<Self, DomainError> {
        use gescom_core::AggregateRoot;

        Ok(Self {
            delivery_id: *delivery.id(),
            delivery_number: delivery.delivery_number().to_string(),
            order_id: delivery.order_id(),
            lines: delivery.lines().to_vec(),
            delivery_address: delivery.delivery_address().map(str::to_string),
            contact_name: delivery.contact_name().map(str::to_string),
            contact_phone: delivery.contact_phone().map(str::to_string),
            notes: delivery.notes().map(str::to_string),
            delivered_by: delivery.delivered_by(),
            delivered_at: delivery.delivered_at(),
        })
    }
}

#[derive(Debug)]
pub struct DeliveriesProjection {
    inner: AggregateStateProjection<Delivery, DeliveryView>,
}

impl Default for DeliveriesProjection {
    fn default() -> Self {
        Self {
            inner: AggregateStateProjection::new(
                Delivery::AGGREGATE_TYPE,
                |id| Delivery::empty(DeliveryId::new(id)),
                DeliveryView::from_delivery,
            ),
        }
    }
}

impl DeliveriesProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, delivery_id: DeliveryId) -> Option<DeliveryView> {
        self.inner.get(tenant_id, delivery_id.aggregate_id()).map(|e| e.view)
    }

    /// Deliveries newest first.
    pub fn list(&self, tenant_id: TenantId) -> Vec<DeliveryView> {
        let mut deliveries: Vec<DeliveryView> =
            self.inner.list(tenant_id).into_iter().map(|e| e.view).collect();
        deliveries.sort_by(|a, b| b.delivered_at.cmp(&a.delivered_at));
        deliveries
    }

    pub fn for_order(&self, tenant_id: TenantId, order_id: SalesOrderId) -> Option<DeliveryView> {
        self.list(tenant_id)
            .into_iter()
            .find(|d| d.order_id == Some(order_id))
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        self.inner.apply_envelope(envelope)
    }

    pub fn reset(&self) {
        self.inner.reset();
    }
}
