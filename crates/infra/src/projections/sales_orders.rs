use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use gescom_core::{AggregateId, ClientId, DomainError, Money, TenantId, UserId};
use gescom_events::EventEnvelope;
use gescom_products::ProductId;
use gescom_sales::{DeliveryId, SalesOrder, SalesOrderId, SalesOrderStatus};

use super::aggregate_state::AggregateStateProjection;
use super::cursor::{Applied, ProjectionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineView {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Sales order as returned by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order_id: SalesOrderId,
    pub order_number: String,
    pub client_id: Option<ClientId>,
    pub status: SalesOrderStatus,
    pub lines: Vec<OrderLineView>,
    pub subtotal: Money,
    pub discount: Money,
    pub total_amount: Money,
    pub items_count: u64,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    pub delivery_id: Option<DeliveryId>,
    pub invoice_id: Option<AggregateId>,
    pub cancel_reason: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl OrderView {
    pub fn from_order(order: &SalesOrder) -> Result<Self, DomainError> {
        use gescom_core::AggregateRoot;

        let totals = order.totals()?;
        let lines = order
            .lines()
            .iter()
            .map(|l| {
                Ok(OrderLineView {
                    line_no: l.line_no,
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    line_total: l.unit_price.times(l.quantity)?,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(Self {
            order_id: order.id_typed(),
            order_number: order.order_number().to_string(),
            client_id: order.client_id(),
            status: order.status(),
            items_count: lines.iter().map(|l| u64::from(l.quantity)).sum(),
            lines,
            subtotal: totals.subtotal,
            discount: totals.discount,
            total_amount: totals.total,
            shipping_address: order.shipping_address().map(str::to_string),
            billing_address: order.billing_address().map(str::to_string),
            notes: order.notes().map(str::to_string),
            delivery_id: order.delivery_id(),
            invoice_id: order.invoice_id(),
            cancel_reason: order.cancel_reason().map(str::to_string),
            created_by: order.created_by(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            version: order.version(),
        })
    }
}

/// Sales orders read model.
#[derive(Debug)]
pub struct SalesOrdersProjection {
    inner: AggregateStateProjection<SalesOrder, OrderView>,
}

impl Default for SalesOrdersProjection {
    fn default() -> Self {
        Self {
            inner: AggregateStateProjection::new(
                SalesOrder::AGGREGATE_TYPE,
                |id| SalesOrder::empty(SalesOrderId::new(id)),
                OrderView::from_order,
            ),
        }
    }
}

impl SalesOrdersProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, order_id: SalesOrderId) -> Option<OrderView> {
        self.inner.get(tenant_id, order_id.aggregate_id()).map(|e| e.view)
    }

    /// Orders newest first, optionally restricted to one status.
    pub fn list(&self, tenant_id: TenantId, status: Option<SalesOrderStatus>) -> Vec<OrderView> {
        let mut orders: Vec<OrderView> = self
            .inner
            .list(tenant_id)
            .into_iter()
            .map(|e| e.view)
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.order_number.cmp(&a.order_number)));
        orders
    }

    pub fn recent(&self, tenant_id: TenantId, count: usize) -> Vec<OrderView> {
        let mut orders = self.list(tenant_id, None);
        orders.truncate(count);
        orders
    }

    /// Sales (delivered or invoiced orders) created in `[from, to)`, optionally
    /// only those taken by one operator.
    pub fn sales_between(
        &self,
        tenant_id: TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        created_by: Option<UserId>,
    ) -> Vec<OrderView> {
        self.list(tenant_id, None)
            .into_iter()
            .filter(|o| o.status.is_sale())
            .filter(|o| o.created_at.is_some_and(|at| at >= from && at < to))
            .filter(|o| created_by.is_none() || o.created_by == created_by)
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        self.inner.apply_envelope(envelope)
    }

    pub fn reset(&self) {
        self.inner.reset();
    }
}
