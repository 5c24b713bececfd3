use serde_json::Value as JsonValue;

use gescom_core::RequestContext;
use gescom_events::{EventBus, EventEnvelope};
use gescom_inventory::{RecordMovement, StockCommand, StockEvent, StockLedger};
use gescom_products::ProductId;
use gescom_sales::{
    Delivery, DeliveryCommand, DeliveryId, MarkDelivered, RecordDelivery, SalesOrder,
    SalesOrderCommand, SalesOrderId,
};

use super::{decide, Committed};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Loaded, UnitOfWork};
use crate::event_store::EventStore;

/// Delivery note fields supplied by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryDetails {
    /// Defaults to the order's shipping address.
    pub delivery_address: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
}

struct LedgerWork {
    product_id: ProductId,
    ledger: Loaded<StockLedger>,
    events: Vec<StockEvent>,
}

/// Deliver a CONFIRMED order.
///
/// One batch holds the order transition, the delivery note and one OUT
/// movement per order line (referencing the delivery number). If any line
/// exceeds the stock on hand the whole delivery is rejected and nothing is
/// written.
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id, delivery_id = %delivery_id))]
pub fn create_delivery<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    delivery_id: DeliveryId,
    details: DeliveryDetails,
) -> Result<Committed<DeliveryId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = ctx.tenant_id;

    let events = dispatcher.with_retry("fulfillment.create_delivery", || {
        let mut order = dispatcher.load(tenant_id, SalesOrder::AGGREGATE_TYPE, order_id.aggregate_id(), |_, id| {
            SalesOrder::empty(SalesOrderId::new(id))
        })?;
        let lines = order.aggregate.delivery_lines();
        let shipping_address = order.aggregate.shipping_address().map(str::to_string);

        // Status guard first: a pending or canceled order never touches stock.
        let order_events = decide(
            &mut order,
            &SalesOrderCommand::MarkDelivered(MarkDelivered {
                tenant_id,
                order_id,
                delivery_id,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;

        let mut delivery = dispatcher.load(tenant_id, Delivery::AGGREGATE_TYPE, delivery_id.aggregate_id(), |_, id| {
            Delivery::empty(DeliveryId::new(id))
        })?;
        let delivery_events = decide(
            &mut delivery,
            &DeliveryCommand::RecordDelivery(RecordDelivery {
                tenant_id,
                delivery_id,
                order_id,
                lines: lines.clone(),
                delivery_address: details.delivery_address.clone().or_else(|| shipping_address.clone()),
                contact_name: details.contact_name.clone(),
                contact_phone: details.contact_phone.clone(),
                notes: details.notes.clone(),
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;
        let reference = delivery.aggregate.delivery_number().to_string();

        // Lines sharing a product are chained on the same in-memory ledger.
        let mut ledgers: Vec<LedgerWork> = Vec::new();
        for line in &lines {
            let idx = match ledgers.iter().position(|w| w.product_id == line.product_id) {
                Some(idx) => idx,
                None => {
                    let ledger = dispatcher.load(
                        tenant_id,
                        StockLedger::AGGREGATE_TYPE,
                        line.product_id.aggregate_id(),
                        |_, id| StockLedger::empty(ProductId::new(id)),
                    )?;
                    ledgers.push(LedgerWork {
                        product_id: line.product_id,
                        ledger,
                        events: Vec::new(),
                    });
                    ledgers.len() - 1
                }
            };

            let work = &mut ledgers[idx];
            let movement = StockCommand::RecordMovement(RecordMovement::outbound(
                tenant_id,
                line.product_id,
                line.quantity,
                reference.clone(),
                ctx.actor,
                ctx.now,
            ));
            let decided = decide(&mut work.ledger, &movement)?;
            work.events.extend(decided);
        }

        let mut unit = UnitOfWork::new();
        unit.record(tenant_id, SalesOrder::AGGREGATE_TYPE, order_id.aggregate_id(), order.version, &order_events)?;
        unit.record(
            tenant_id,
            Delivery::AGGREGATE_TYPE,
            delivery_id.aggregate_id(),
            delivery.version,
            &delivery_events,
        )?;
        for work in &ledgers {
            unit.record(
                tenant_id,
                StockLedger::AGGREGATE_TYPE,
                work.product_id.aggregate_id(),
                work.ledger.version,
                &work.events,
            )?;
        }
        dispatcher.commit(unit)
    })?;

    tracing::info!(events = events.len(), "delivery recorded");
    Ok(Committed::new(delivery_id, events))
}
