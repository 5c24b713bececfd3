use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gescom_core::numbering::{document_number, ORDER_PREFIX};
use gescom_core::{
    Aggregate, AggregateId, AggregateRoot, ClientId, DomainError, DomainResult, Money, TaxRate,
    TenantId, UserId,
};
use gescom_events::Event;
use gescom_pricing::{invoice_totals, order_subtotal, PricedLine, Totals};
use gescom_products::ProductId;

use crate::delivery::{DeliveryId, DeliveryLine};

gescom_core::aggregate_id_newtype!(
    /// Sales order identifier (tenant-scoped via `tenant_id` fields in events/commands).
    SalesOrderId
);

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalesOrderStatus {
    Pending,
    Confirmed,
    Delivered,
    Invoiced,
    Canceled,
}

impl SalesOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SalesOrderStatus::Pending => "PENDING",
            SalesOrderStatus::Confirmed => "CONFIRMED",
            SalesOrderStatus::Delivered => "DELIVERED",
            SalesOrderStatus::Invoiced => "INVOICED",
            SalesOrderStatus::Canceled => "CANCELED",
        }
    }

    /// Orders that count as sales in reports.
    pub fn is_sale(self) -> bool {
        matches!(self, SalesOrderStatus::Delivered | SalesOrderStatus::Invoiced)
    }

    pub fn is_cancelable(self) -> bool {
        matches!(self, SalesOrderStatus::Pending | SalesOrderStatus::Confirmed)
    }
}

impl core::fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SalesOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(SalesOrderStatus::Pending),
            "CONFIRMED" => Ok(SalesOrderStatus::Confirmed),
            "DELIVERED" => Ok(SalesOrderStatus::Delivered),
            "INVOICED" => Ok(SalesOrderStatus::Invoiced),
            "CANCELED" => Ok(SalesOrderStatus::Canceled),
            other => Err(DomainError::invalid_input(format!("unknown order status '{other}'"))),
        }
    }
}

/// Order line: product, quantity, unit price captured when the line was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn priced(&self) -> PricedLine {
        PricedLine::new(i64::from(self.quantity), self.unit_price.amount())
    }
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesOrder {
    id: SalesOrderId,
    tenant_id: Option<TenantId>,
    order_number: String,
    client_id: Option<ClientId>,
    shipping_address: Option<String>,
    billing_address: Option<String>,
    notes: Option<String>,
    status: SalesOrderStatus,
    lines: Vec<OrderLine>,
    next_line_no: u32,
    discount: Money,
    delivery_id: Option<DeliveryId>,
    invoice_id: Option<AggregateId>,
    cancel_reason: Option<String>,
    created_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SalesOrder {
    pub const AGGREGATE_TYPE: &'static str = "sales.order";

    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            order_number: String::new(),
            client_id: None,
            shipping_address: None,
            billing_address: None,
            notes: None,
            status: SalesOrderStatus::Pending,
            lines: Vec::new(),
            next_line_no: 1,
            discount: Money::zero(),
            delivery_id: None,
            invoice_id: None,
            cancel_reason: None,
            created_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn shipping_address(&self) -> Option<&str> {
        self.shipping_address.as_deref()
    }

    pub fn billing_address(&self) -> Option<&str> {
        self.billing_address.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn status(&self) -> SalesOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn delivery_id(&self) -> Option<DeliveryId> {
        self.delivery_id
    }

    pub fn invoice_id(&self) -> Option<AggregateId> {
        self.invoice_id
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Lines can be added, removed or discounted.
    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, SalesOrderStatus::Pending)
    }

    pub fn subtotal(&self) -> DomainResult<Money> {
        let priced: Vec<PricedLine> = self.lines.iter().map(OrderLine::priced).collect();
        order_subtotal(&priced)
    }

    /// Order amounts before tax (tax is applied on the invoice).
    pub fn totals(&self) -> DomainResult<Totals> {
        invoice_totals(self.subtotal()?, self.discount, TaxRate::zero())
    }

    /// What a delivery of this order ships: every line, in line order.
    pub fn delivery_lines(&self) -> Vec<DeliveryLine> {
        self.lines
            .iter()
            .map(|l| DeliveryLine {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect()
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub client_id: ClientId,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
///
/// `unit_price` is the product's selling price at the time the line is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetDiscount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDiscount {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub discount: Money,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDelivered {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub delivery_id: DeliveryId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkInvoiced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInvoiced {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reason: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderCommand {
    PlaceOrder(PlaceOrder),
    AddLine(AddLine),
    RemoveLine(RemoveLine),
    SetDiscount(SetDiscount),
    ConfirmOrder(ConfirmOrder),
    MarkDelivered(MarkDelivered),
    MarkInvoiced(MarkInvoiced),
    CancelOrder(CancelOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub order_number: String,
    pub client_id: ClientId,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line_no: u32,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscountSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountSet {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub discount: Money,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub delivery_id: DeliveryId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderInvoiced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInvoiced {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCanceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reason: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderEvent {
    OrderPlaced(OrderPlaced),
    LineAdded(LineAdded),
    LineRemoved(LineRemoved),
    DiscountSet(DiscountSet),
    OrderConfirmed(OrderConfirmed),
    OrderDelivered(OrderDelivered),
    OrderInvoiced(OrderInvoiced),
    OrderCanceled(OrderCanceled),
}

impl SalesOrderEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            SalesOrderEvent::OrderPlaced(e) => e.tenant_id,
            SalesOrderEvent::LineAdded(e) => e.tenant_id,
            SalesOrderEvent::LineRemoved(e) => e.tenant_id,
            SalesOrderEvent::DiscountSet(e) => e.tenant_id,
            SalesOrderEvent::OrderConfirmed(e) => e.tenant_id,
            SalesOrderEvent::OrderDelivered(e) => e.tenant_id,
            SalesOrderEvent::OrderInvoiced(e) => e.tenant_id,
            SalesOrderEvent::OrderCanceled(e) => e.tenant_id,
        }
    }

    pub fn order_id(&self) -> SalesOrderId {
        match self {
            SalesOrderEvent::OrderPlaced(e) => e.order_id,
            SalesOrderEvent::LineAdded(e) => e.order_id,
            SalesOrderEvent::LineRemoved(e) => e.order_id,
            SalesOrderEvent::DiscountSet(e) => e.order_id,
            SalesOrderEvent::OrderConfirmed(e) => e.order_id,
            SalesOrderEvent::OrderDelivered(e) => e.order_id,
            SalesOrderEvent::OrderInvoiced(e) => e.order_id,
            SalesOrderEvent::OrderCanceled(e) => e.order_id,
        }
    }
}

impl Event for SalesOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesOrderEvent::OrderPlaced(_) => "sales.order.placed",
            SalesOrderEvent::LineAdded(_) => "sales.order.line_added",
            SalesOrderEvent::LineRemoved(_) => "sales.order.line_removed",
            SalesOrderEvent::DiscountSet(_) => "sales.order.discount_set",
            SalesOrderEvent::OrderConfirmed(_) => "sales.order.confirmed",
            SalesOrderEvent::OrderDelivered(_) => "sales.order.delivered",
            SalesOrderEvent::OrderInvoiced(_) => "sales.order.invoiced",
            SalesOrderEvent::OrderCanceled(_) => "sales.order.canceled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesOrderEvent::OrderPlaced(e) => e.occurred_at,
            SalesOrderEvent::LineAdded(e) => e.occurred_at,
            SalesOrderEvent::LineRemoved(e) => e.occurred_at,
            SalesOrderEvent::DiscountSet(e) => e.occurred_at,
            SalesOrderEvent::OrderConfirmed(e) => e.occurred_at,
            SalesOrderEvent::OrderDelivered(e) => e.occurred_at,
            SalesOrderEvent::OrderInvoiced(e) => e.occurred_at,
            SalesOrderEvent::OrderCanceled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesOrder {
    type Command = SalesOrderCommand;
    type Event = SalesOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesOrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.order_number = e.order_number.clone();
                self.client_id = Some(e.client_id);
                self.shipping_address = e.shipping_address.clone();
                self.billing_address = e.billing_address.clone();
                self.notes = e.notes.clone();
                self.status = SalesOrderStatus::Pending;
                self.lines.clear();
                self.next_line_no = 1;
                self.created_by = e.actor;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            SalesOrderEvent::LineAdded(e) => {
                self.lines.push(OrderLine {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity: e.quantity,
                    unit_price: e.unit_price,
                });
                self.next_line_no = self.next_line_no.max(e.line_no + 1);
            }
            SalesOrderEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
            }
            SalesOrderEvent::DiscountSet(e) => {
                self.discount = e.discount;
            }
            SalesOrderEvent::OrderConfirmed(_) => {
                self.status = SalesOrderStatus::Confirmed;
            }
            SalesOrderEvent::OrderDelivered(e) => {
                self.status = SalesOrderStatus::Delivered;
                self.delivery_id = Some(e.delivery_id);
            }
            SalesOrderEvent::OrderInvoiced(e) => {
                self.status = SalesOrderStatus::Invoiced;
                self.invoice_id = Some(e.invoice_id);
            }
            SalesOrderEvent::OrderCanceled(e) => {
                self.status = SalesOrderStatus::Canceled;
                self.cancel_reason = e.reason.clone();
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesOrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            SalesOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SalesOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            SalesOrderCommand::SetDiscount(cmd) => self.handle_set_discount(cmd),
            SalesOrderCommand::ConfirmOrder(cmd) => self.handle_confirm(cmd),
            SalesOrderCommand::MarkDelivered(cmd) => self.handle_mark_delivered(cmd),
            SalesOrderCommand::MarkInvoiced(cmd) => self.handle_mark_invoiced(cmd),
            SalesOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SalesOrder {
    fn ensure_exists(&self, tenant_id: TenantId, order_id: SalesOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_modifiable(&self) -> Result<(), DomainError> {
        if !self.is_modifiable() {
            return Err(DomainError::order_locked(format!(
                "lines can only change while the order is PENDING (order is {})",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sales order already exists"));
        }

        Ok(vec![SalesOrderEvent::OrderPlaced(OrderPlaced {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            order_number: document_number(ORDER_PREFIX, cmd.occurred_at, &cmd.order_id.aggregate_id()),
            client_id: cmd.client_id,
            shipping_address: cmd.shipping_address.clone(),
            billing_address: cmd.billing_address.clone(),
            notes: cmd.notes.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_modifiable()?;

        if cmd.quantity == 0 {
            return Err(DomainError::invalid_input("quantity must be positive"));
        }

        let line_no = self.next_line_no;
        let candidate = OrderLine {
            line_no,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
        };
        let priced: Vec<PricedLine> = self
            .lines
            .iter()
            .chain(core::iter::once(&candidate))
            .map(OrderLine::priced)
            .collect();
        order_subtotal(&priced)?;

        Ok(vec![SalesOrderEvent::LineAdded(LineAdded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_modifiable()?;

        if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::invalid_input(format!(
                "order has no line {}",
                cmd.line_no
            )));
        }

        let remaining: Vec<PricedLine> = self
            .lines
            .iter()
            .filter(|l| l.line_no != cmd.line_no)
            .map(OrderLine::priced)
            .collect();
        let subtotal = order_subtotal(&remaining)?;
        if self.discount > subtotal {
            return Err(DomainError::invalid_input(format!(
                "discount {} would exceed subtotal {subtotal}",
                self.discount
            )));
        }

        Ok(vec![SalesOrderEvent::LineRemoved(LineRemoved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_discount(&self, cmd: &SetDiscount) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;
        self.ensure_modifiable()?;

        invoice_totals(self.subtotal()?, cmd.discount, TaxRate::zero())?;

        if cmd.discount == self.discount {
            return Ok(vec![]);
        }

        Ok(vec![SalesOrderEvent::DiscountSet(DiscountSet {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            discount: cmd.discount,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        if self.status != SalesOrderStatus::Pending {
            return Err(DomainError::order_locked(format!(
                "only PENDING orders can be confirmed (order is {})",
                self.status
            )));
        }

        if self.lines.is_empty() {
            return Err(DomainError::invalid_input("cannot confirm order without lines"));
        }

        Ok(vec![SalesOrderEvent::OrderConfirmed(OrderConfirmed {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_delivered(
        &self,
        cmd: &MarkDelivered,
    ) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        if self.status != SalesOrderStatus::Confirmed {
            return Err(DomainError::order_locked(format!(
                "only CONFIRMED orders can be delivered (order is {})",
                self.status
            )));
        }

        Ok(vec![SalesOrderEvent::OrderDelivered(OrderDelivered {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            delivery_id: cmd.delivery_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_invoiced(
        &self,
        cmd: &MarkInvoiced,
    ) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        match self.status {
            SalesOrderStatus::Delivered => {}
            SalesOrderStatus::Invoiced => return Err(DomainError::DuplicateInvoice),
            _ => return Err(DomainError::OrderNotDelivered),
        }

        Ok(vec![SalesOrderEvent::OrderInvoiced(OrderInvoiced {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            invoice_id: cmd.invoice_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.order_id)?;

        if !self.status.is_cancelable() {
            return Err(DomainError::order_locked(format!(
                "only PENDING or CONFIRMED orders can be canceled (order is {})",
                self.status
            )));
        }

        Ok(vec![SalesOrderEvent::OrderCanceled(OrderCanceled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;
    use gescom_events::execute;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::generate()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    struct Fixture {
        tenant_id: TenantId,
        order_id: SalesOrderId,
        order: SalesOrder,
    }

    impl Fixture {
        fn placed() -> Self {
            let tenant_id = test_tenant_id();
            let order_id = SalesOrderId::generate();
            let mut order = SalesOrder::empty(order_id);
            execute(
                &mut order,
                &SalesOrderCommand::PlaceOrder(PlaceOrder {
                    tenant_id,
                    order_id,
                    client_id: ClientId::new(),
                    shipping_address: None,
                    billing_address: None,
                    notes: None,
                    actor: None,
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
            Self {
                tenant_id,
                order_id,
                order,
            }
        }

        fn add_line(&self, quantity: u32, unit_price: &str) -> SalesOrderCommand {
            SalesOrderCommand::AddLine(AddLine {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                product_id: test_product_id(),
                quantity,
                unit_price: money(unit_price),
                actor: None,
                occurred_at: test_time(),
            })
        }

        fn confirm(&self) -> SalesOrderCommand {
            SalesOrderCommand::ConfirmOrder(ConfirmOrder {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                actor: None,
                occurred_at: test_time(),
            })
        }

        fn deliver(&self) -> SalesOrderCommand {
            SalesOrderCommand::MarkDelivered(MarkDelivered {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                delivery_id: DeliveryId::generate(),
                actor: None,
                occurred_at: test_time(),
            })
        }

        fn invoice(&self) -> SalesOrderCommand {
            SalesOrderCommand::MarkInvoiced(MarkInvoiced {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                invoice_id: AggregateId::new(),
                actor: None,
                occurred_at: test_time(),
            })
        }

        fn cancel(&self) -> SalesOrderCommand {
            SalesOrderCommand::CancelOrder(CancelOrder {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                reason: Some("client changed mind".to_string()),
                actor: None,
                occurred_at: test_time(),
            })
        }

        fn discount(&self, amount: &str) -> SalesOrderCommand {
            SalesOrderCommand::SetDiscount(SetDiscount {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                discount: money(amount),
                actor: None,
                occurred_at: test_time(),
            })
        }

        fn remove_line(&self, line_no: u32) -> SalesOrderCommand {
            SalesOrderCommand::RemoveLine(RemoveLine {
                tenant_id: self.tenant_id,
                order_id: self.order_id,
                line_no,
                actor: None,
                occurred_at: test_time(),
            })
        }

        fn run(&mut self, cmd: SalesOrderCommand) -> Result<Vec<SalesOrderEvent>, DomainError> {
            execute(&mut self.order, &cmd)
        }
    }

    #[test]
    fn place_order_starts_pending_with_number() {
        let f = Fixture::placed();
        assert_eq!(f.order.status(), SalesOrderStatus::Pending);
        assert!(f.order.order_number().starts_with("CMD-"));
        assert_eq!(f.order.version(), 1);
    }

    #[test]
    fn lines_snapshot_price_and_total_excludes_tax() {
        let mut f = Fixture::placed();
        f.run(f.add_line(3, "10.00")).unwrap();
        f.run(f.add_line(1, "5.00")).unwrap();

        let totals = f.order.totals().unwrap();
        assert_eq!(totals.subtotal, money("35.00"));
        assert_eq!(totals.tax_amount, Money::zero());
        assert_eq!(totals.total, money("35.00"));
        assert_eq!(
            f.order.lines().iter().map(|l| l.line_no).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn line_numbers_are_not_reused_after_removal() {
        let mut f = Fixture::placed();
        f.run(f.add_line(1, "1.00")).unwrap();
        f.run(f.add_line(1, "2.00")).unwrap();
        f.run(f.remove_line(2)).unwrap();
        f.run(f.add_line(1, "3.00")).unwrap();

        let nos: Vec<_> = f.order.lines().iter().map(|l| l.line_no).collect();
        assert_eq!(nos, vec![1, 3]);

        assert!(matches!(f.run(f.remove_line(2)), Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let mut f = Fixture::placed();
        assert!(matches!(f.run(f.add_line(0, "1.00")), Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn discount_cannot_exceed_subtotal() {
        let mut f = Fixture::placed();
        f.run(f.add_line(2, "10.00")).unwrap();

        assert!(matches!(f.run(f.discount("20.01")), Err(DomainError::InvalidInput(_))));
        f.run(f.discount("5.00")).unwrap();
        assert_eq!(f.order.totals().unwrap().total, money("15.00"));

        // Removing the only line would leave the discount above the subtotal.
        assert!(matches!(f.run(f.remove_line(1)), Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn confirm_requires_lines() {
        let mut f = Fixture::placed();
        assert!(matches!(f.run(f.confirm()), Err(DomainError::InvalidInput(_))));
        assert_eq!(f.order.status(), SalesOrderStatus::Pending);
    }

    #[test]
    fn confirmed_order_is_locked_for_edits() {
        let mut f = Fixture::placed();
        f.run(f.add_line(1, "9.99")).unwrap();
        f.run(f.confirm()).unwrap();

        assert!(matches!(f.run(f.add_line(1, "1.00")), Err(DomainError::OrderLocked(_))));
        assert!(matches!(f.run(f.remove_line(1)), Err(DomainError::OrderLocked(_))));
        assert!(matches!(f.run(f.discount("1.00")), Err(DomainError::OrderLocked(_))));
        assert!(matches!(f.run(f.confirm()), Err(DomainError::OrderLocked(_))));
    }

    #[test]
    fn full_lifecycle_pending_to_invoiced() {
        let mut f = Fixture::placed();
        f.run(f.add_line(2, "4.50")).unwrap();
        f.run(f.confirm()).unwrap();
        f.run(f.deliver()).unwrap();
        assert_eq!(f.order.status(), SalesOrderStatus::Delivered);
        assert!(f.order.delivery_id().is_some());

        f.run(f.invoice()).unwrap();
        assert_eq!(f.order.status(), SalesOrderStatus::Invoiced);
        assert!(f.order.invoice_id().is_some());
        assert_eq!(f.order.version(), 5);

        assert_eq!(f.run(f.invoice()).unwrap_err(), DomainError::DuplicateInvoice);
    }

    #[test]
    fn pending_order_cannot_be_delivered_or_invoiced() {
        let mut f = Fixture::placed();
        f.run(f.add_line(1, "1.00")).unwrap();

        assert!(matches!(f.run(f.deliver()), Err(DomainError::OrderLocked(_))));
        assert_eq!(f.run(f.invoice()).unwrap_err(), DomainError::OrderNotDelivered);

        f.run(f.confirm()).unwrap();
        assert_eq!(f.run(f.invoice()).unwrap_err(), DomainError::OrderNotDelivered);
    }

    #[test]
    fn cancel_only_before_delivery() {
        let mut f = Fixture::placed();
        f.run(f.cancel()).unwrap();
        assert_eq!(f.order.status(), SalesOrderStatus::Canceled);
        assert!(matches!(f.run(f.cancel()), Err(DomainError::OrderLocked(_))));
        assert!(matches!(f.run(f.confirm()), Err(DomainError::OrderLocked(_))));

        let mut f = Fixture::placed();
        f.run(f.add_line(1, "1.00")).unwrap();
        f.run(f.confirm()).unwrap();
        f.run(f.cancel()).unwrap();
        assert_eq!(f.order.status(), SalesOrderStatus::Canceled);

        let mut f = Fixture::placed();
        f.run(f.add_line(1, "1.00")).unwrap();
        f.run(f.confirm()).unwrap();
        f.run(f.deliver()).unwrap();
        assert!(matches!(f.run(f.cancel()), Err(DomainError::OrderLocked(_))));
        assert_eq!(f.order.status(), SalesOrderStatus::Delivered);
    }

    #[test]
    fn commands_against_missing_order_are_not_found() {
        let order = SalesOrder::empty(SalesOrderId::generate());
        let f = Fixture::placed();
        assert_eq!(order.handle(&f.confirm()).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let f = Fixture::placed();
        let before = f.order.clone();
        let _ = f.order.handle(&f.add_line(1, "1.00")).unwrap();
        assert_eq!(f.order, before);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("delivered".parse::<SalesOrderStatus>().unwrap(), SalesOrderStatus::Delivered);
        assert!("shipped".parse::<SalesOrderStatus>().is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum Op {
            Add,
            Confirm,
            Deliver,
            Invoice,
            Cancel,
        }

        fn rank(status: SalesOrderStatus) -> u8 {
            match status {
                SalesOrderStatus::Pending => 0,
                SalesOrderStatus::Confirmed => 1,
                SalesOrderStatus::Delivered => 2,
                SalesOrderStatus::Invoiced => 3,
                SalesOrderStatus::Canceled => 4,
            }
        }

        fn allowed(from: SalesOrderStatus, to: SalesOrderStatus) -> bool {
            use SalesOrderStatus::*;
            from == to
                || matches!(
                    (from, to),
                    (Pending, Confirmed)
                        | (Confirmed, Delivered)
                        | (Delivered, Invoiced)
                        | (Pending, Canceled)
                        | (Confirmed, Canceled)
                )
        }

        proptest! {
            /// Whatever commands are thrown at it, the order only moves along the
            /// lifecycle edges, and failed commands leave it untouched.
            #[test]
            fn status_only_moves_forward(ops in prop::collection::vec(
                prop_oneof![
                    Just(Op::Add),
                    Just(Op::Confirm),
                    Just(Op::Deliver),
                    Just(Op::Invoice),
                    Just(Op::Cancel),
                ],
                0..30,
            )) {
                let mut f = Fixture::placed();
                for op in ops {
                    let cmd = match op {
                        Op::Add => f.add_line(1, "2.50"),
                        Op::Confirm => f.confirm(),
                        Op::Deliver => f.deliver(),
                        Op::Invoice => f.invoice(),
                        Op::Cancel => f.cancel(),
                    };
                    let before = f.order.clone();
                    match f.run(cmd) {
                        Ok(_) => {
                            prop_assert!(allowed(before.status(), f.order.status()));
                            if f.order.status() != SalesOrderStatus::Canceled {
                                prop_assert!(rank(f.order.status()) >= rank(before.status()));
                            }
                        }
                        Err(_) => prop_assert_eq!(&f.order, &before),
                    }
                }
            }
        }
    }
}
