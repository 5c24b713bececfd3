use serde_json::Value as JsonValue;

use gescom_core::{DomainError, Money, RequestContext};
use gescom_events::{EventBus, EventEnvelope};
use gescom_inventory::{
    MovementOutcome, MovementQuantity, MovementType, RecordMovement, StockCommand, StockLedger,
};
use gescom_products::ProductId;

use super::{decide, load_product, Committed};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, UnitOfWork};
use crate::event_store::EventStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: MovementQuantity,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub unit_cost: Option<Money>,
}

/// Record one movement on a product's ledger.
///
/// The catalog stream is only read (the product must exist); the ledger
/// stream is the one appended to, so concurrent movements on the same product
/// are serialized by its version and re-checked against fresh stock on retry.
#[tracing::instrument(
    skip_all,
    fields(
        tenant_id = %ctx.tenant_id,
        product_id = %request.product_id,
        movement_type = %request.movement_type,
    )
)]
pub fn record_movement<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    request: MovementRequest,
) -> Result<Committed<MovementOutcome>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let product_id = request.product_id;
    let command = StockCommand::RecordMovement(RecordMovement {
        tenant_id: ctx.tenant_id,
        product_id,
        movement_type: request.movement_type,
        quantity: request.quantity,
        reason: request.reason,
        reference: request.reference,
        unit_cost: request.unit_cost,
        actor: ctx.actor,
        occurred_at: ctx.now,
    });

    let (outcome, events) = dispatcher.with_retry("stock.record_movement", || {
        load_product(dispatcher, ctx.tenant_id, product_id)?;

        let mut ledger = dispatcher.load(
            ctx.tenant_id,
            StockLedger::AGGREGATE_TYPE,
            product_id.aggregate_id(),
            |_, id| StockLedger::empty(ProductId::new(id)),
        )?;
        let decided = decide(&mut ledger, &command)?;
        let outcome = MovementOutcome::from_events(&decided)
            .ok_or_else(|| DomainError::invariant("movement produced no ledger event"))?;

        let mut unit = UnitOfWork::new();
        unit.record(
            ctx.tenant_id,
            StockLedger::AGGREGATE_TYPE,
            product_id.aggregate_id(),
            ledger.version,
            &decided,
        )?;
        Ok((outcome, dispatcher.commit(unit)?))
    })?;

    tracing::info!(
        previous_quantity = outcome.previous_quantity,
        new_quantity = outcome.new_quantity,
        "stock movement recorded"
    );
    Ok(Committed::new(outcome, events))
}
