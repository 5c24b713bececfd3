use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gescom_core::numbering::{document_number, DELIVERY_PREFIX};
use gescom_core::{Aggregate, AggregateRoot, DomainError, TenantId, UserId};
use gescom_events::Event;
use gescom_products::ProductId;

use crate::order::SalesOrderId;

gescom_core::aggregate_id_newtype!(
    /// Delivery note identifier.
    DeliveryId
);

/// Delivered quantity of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Aggregate root: Delivery.
///
/// Written once, when the goods leave; the matching stock movements and the
/// order transition are committed in the same batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    id: DeliveryId,
    tenant_id: Option<TenantId>,
    delivery_number: String,
    order_id: Option<SalesOrderId>,
    lines: Vec<DeliveryLine>,
    delivery_address: Option<String>,
    contact_name: Option<String>,
    contact_phone: Option<String>,
    notes: Option<String>,
    delivered_by: Option<UserId>,
    delivered_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Delivery {
    pub const AGGREGATE_TYPE: &'static str = "sales.delivery";

    pub fn empty(id: DeliveryId) -> Self {
        Self {
            id,
            tenant_id: None,
            delivery_number: String::new(),
            order_id: None,
            lines: Vec::new(),
            delivery_address: None,
            contact_name: None,
            contact_phone: None,
            notes: None,
            delivered_by: None,
            delivered_at: None,
            version: 0,
        }
    }

    pub fn exists(&self) -> bool {
        self.order_id.is_some()
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn delivery_number(&self) -> &str {
        &self.delivery_number
    }

    pub fn order_id(&self) -> Option<SalesOrderId> {
        self.order_id
    }

    pub fn lines(&self) -> &[DeliveryLine] {
        &self.lines
    }

    pub fn delivery_address(&self) -> Option<&str> {
        self.delivery_address.as_deref()
    }

    pub fn contact_name(&self) -> Option<&str> {
        self.contact_name.as_deref()
    }

    pub fn contact_phone(&self) -> Option<&str> {
        self.contact_phone.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn delivered_by(&self) -> Option<UserId> {
        self.delivered_by
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }
}

impl AggregateRoot for Delivery {
    type Id = DeliveryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordDelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDelivery {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryId,
    pub order_id: SalesOrderId,
    pub lines: Vec<DeliveryLine>,
    pub delivery_address: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryCommand {
    RecordDelivery(RecordDelivery),
}

/// Event: DeliveryRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecorded {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryId,
    pub delivery_number: String,
    pub order_id: SalesOrderId,
    pub lines: Vec<DeliveryLine>,
    pub delivery_address: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryEvent {
    DeliveryRecorded(DeliveryRecorded),
}

impl DeliveryEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            DeliveryEvent::DeliveryRecorded(e) => e.tenant_id,
        }
    }
}

impl Event for DeliveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryEvent::DeliveryRecorded(_) => "sales.delivery.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeliveryEvent::DeliveryRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Delivery {
    type Command = DeliveryCommand;
    type Event = DeliveryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DeliveryEvent::DeliveryRecorded(e) => {
                self.id = e.delivery_id;
                self.tenant_id = Some(e.tenant_id);
                self.delivery_number = e.delivery_number.clone();
                self.order_id = Some(e.order_id);
                self.lines = e.lines.clone();
                self.delivery_address = e.delivery_address.clone();
                self.contact_name = e.contact_name.clone();
                self.contact_phone = e.contact_phone.clone();
                self.notes = e.notes.clone();
                self.delivered_by = e.actor;
                self.delivered_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryCommand::RecordDelivery(cmd) => self.handle_record(cmd),
        }
    }
}

impl Delivery {
    fn handle_record(&self, cmd: &RecordDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        if self.exists() {
            return Err(DomainError::conflict("delivery already recorded"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::invalid_input("a delivery needs at least one line"));
        }
        if cmd.lines.iter().any(|l| l.quantity == 0) {
            return Err(DomainError::invalid_input("delivered quantity must be positive"));
        }

        Ok(vec![DeliveryEvent::DeliveryRecorded(DeliveryRecorded {
            tenant_id: cmd.tenant_id,
            delivery_id: cmd.delivery_id,
            delivery_number: document_number(
                DELIVERY_PREFIX,
                cmd.occurred_at,
                &cmd.delivery_id.aggregate_id(),
            ),
            order_id: cmd.order_id,
            lines: cmd.lines.clone(),
            delivery_address: cmd.delivery_address.clone(),
            contact_name: cmd.contact_name.clone(),
            contact_phone: cmd.contact_phone.clone(),
            notes: cmd.notes.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gescom_events::execute;

    fn record_cmd(lines: Vec<DeliveryLine>) -> RecordDelivery {
        RecordDelivery {
            tenant_id: TenantId::new(),
            delivery_id: DeliveryId::generate(),
            order_id: SalesOrderId::generate(),
            lines,
            delivery_address: Some("12 rue des Lilas".to_string()),
            contact_name: None,
            contact_phone: None,
            notes: None,
            actor: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn record_delivery_assigns_number_once() {
        let line = DeliveryLine {
            product_id: ProductId::generate(),
            quantity: 2,
        };
        let cmd = record_cmd(vec![line]);
        let mut delivery = Delivery::empty(cmd.delivery_id);

        execute(&mut delivery, &DeliveryCommand::RecordDelivery(cmd.clone())).unwrap();
        assert!(delivery.delivery_number().starts_with("LIV-"));
        assert_eq!(delivery.order_id(), Some(cmd.order_id));
        assert_eq!(delivery.lines(), &[line]);

        let err = delivery.handle(&DeliveryCommand::RecordDelivery(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn empty_or_zero_lines_are_rejected() {
        let cmd = record_cmd(vec![]);
        let delivery = Delivery::empty(cmd.delivery_id);
        assert!(matches!(
            delivery.handle(&DeliveryCommand::RecordDelivery(cmd)),
            Err(DomainError::InvalidInput(_))
        ));

        let cmd = record_cmd(vec![DeliveryLine {
            product_id: ProductId::generate(),
            quantity: 0,
        }]);
        assert!(matches!(
            delivery.handle(&DeliveryCommand::RecordDelivery(cmd)),
            Err(DomainError::InvalidInput(_))
        ));
    }
}
