use serde_json::Value as JsonValue;

use gescom_core::{ClientId, DomainError, Money, RequestContext, TenantId};
use gescom_events::{EventBus, EventEnvelope};
use gescom_products::ProductId;
use gescom_sales::{
    AddLine, CancelOrder, ConfirmOrder, PlaceOrder, RemoveLine, SalesOrder, SalesOrderCommand,
    SalesOrderId, SetDiscount,
};

use super::{decide, load_client, load_product, Committed};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Loaded, UnitOfWork};
use crate::event_store::{EventStore, StoredEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub client_id: ClientId,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<NewLine>,
    pub discount: Option<Money>,
}

fn load_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    order_id: SalesOrderId,
) -> Result<Loaded<SalesOrder>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatcher.load(tenant_id, SalesOrder::AGGREGATE_TYPE, order_id.aggregate_id(), |_, id| {
        SalesOrder::empty(SalesOrderId::new(id))
    })
}

/// Build an `AddLine` priced at the product's current selling price.
fn priced_line<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    line: NewLine,
) -> Result<SalesOrderCommand, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let product = load_product(dispatcher, ctx.tenant_id, line.product_id)?;
    if !product.aggregate.can_be_sold() {
        return Err(DomainError::invalid_input(format!(
            "product {} is inactive and cannot be ordered",
            product.aggregate.code()
        ))
        .into());
    }

    Ok(SalesOrderCommand::AddLine(AddLine {
        tenant_id: ctx.tenant_id,
        order_id,
        product_id: line.product_id,
        quantity: line.quantity,
        unit_price: product.aggregate.prices().selling_price,
        actor: ctx.actor,
        occurred_at: ctx.now,
    }))
}

fn commit_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order: &Loaded<SalesOrder>,
    decided: &[gescom_sales::SalesOrderEvent],
) -> Result<Vec<StoredEvent>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut unit = UnitOfWork::new();
    unit.record(
        ctx.tenant_id,
        SalesOrder::AGGREGATE_TYPE,
        order.aggregate.id_typed().aggregate_id(),
        order.version,
        decided,
    )?;
    dispatcher.commit(unit)
}

/// Place a PENDING order, optionally with its first lines and a discount.
///
/// The client must be registered (`NotFound`) and active (`InvalidInput`).
/// Everything lands in the order stream in one append: a bad line leaves no
/// half-built order behind.
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
pub fn place_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    order: NewOrder,
) -> Result<Committed<SalesOrderId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let events = dispatcher.with_retry("orders.place_order", || {
        let client = load_client(dispatcher, ctx.tenant_id, order.client_id)?;
        if !client.aggregate.can_order() {
            return Err(DomainError::invalid_input(format!(
                "client {} is inactive and cannot order",
                client.aggregate.details().display_name()
            ))
            .into());
        }

        let mut loaded = load_order(dispatcher, ctx.tenant_id, order_id)?;

        let mut decided = decide(
            &mut loaded,
            &SalesOrderCommand::PlaceOrder(PlaceOrder {
                tenant_id: ctx.tenant_id,
                order_id,
                client_id: order.client_id,
                shipping_address: order.shipping_address.clone(),
                billing_address: order.billing_address.clone(),
                notes: order.notes.clone(),
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;

        for line in &order.lines {
            let add = priced_line(dispatcher, ctx, order_id, *line)?;
            decided.extend(decide(&mut loaded, &add)?);
        }

        if let Some(discount) = order.discount {
            decided.extend(decide(
                &mut loaded,
                &SalesOrderCommand::SetDiscount(SetDiscount {
                    tenant_id: ctx.tenant_id,
                    order_id,
                    discount,
                    actor: ctx.actor,
                    occurred_at: ctx.now,
                }),
            )?);
        }

        // `loaded.version` is still the version the stream was read at.
        commit_order(dispatcher, ctx, &loaded, &decided)
    })?;

    tracing::info!(lines = order.lines.len(), "order placed");
    Ok(Committed::new(order_id, events))
}

#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
pub fn add_line<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    line: NewLine,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let events = dispatcher.with_retry("orders.add_line", || {
        let mut loaded = load_order(dispatcher, ctx.tenant_id, order_id)?;
        if !loaded.aggregate.exists() {
            return Err(DomainError::NotFound.into());
        }
        let add = priced_line(dispatcher, ctx, order_id, line)?;
        let decided = decide(&mut loaded, &add)?;
        commit_order(dispatcher, ctx, &loaded, &decided)
    })?;
    Ok(Committed::new((), events))
}

fn dispatch_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    command: SalesOrderCommand,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let events = dispatcher.dispatch(
        ctx.tenant_id,
        order_id.aggregate_id(),
        SalesOrder::AGGREGATE_TYPE,
        command,
        |_, id| SalesOrder::empty(SalesOrderId::new(id)),
    )?;
    Ok(Committed::new((), events))
}

pub fn remove_line<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    line_no: u32,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatch_order(
        dispatcher,
        ctx,
        order_id,
        SalesOrderCommand::RemoveLine(RemoveLine {
            tenant_id: ctx.tenant_id,
            order_id,
            line_no,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )
}

pub fn set_discount<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    discount: Money,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatch_order(
        dispatcher,
        ctx,
        order_id,
        SalesOrderCommand::SetDiscount(SetDiscount {
            tenant_id: ctx.tenant_id,
            order_id,
            discount,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )
}

#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
pub fn confirm_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let committed = dispatch_order(
        dispatcher,
        ctx,
        order_id,
        SalesOrderCommand::ConfirmOrder(ConfirmOrder {
            tenant_id: ctx.tenant_id,
            order_id,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )?;
    tracing::info!("order confirmed");
    Ok(committed)
}

/// Cancel a PENDING or CONFIRMED order. No stock was taken yet, so nothing is released.
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
pub fn cancel_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    reason: Option<String>,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let committed = dispatch_order(
        dispatcher,
        ctx,
        order_id,
        SalesOrderCommand::CancelOrder(CancelOrder {
            tenant_id: ctx.tenant_id,
            order_id,
            reason,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )?;
    tracing::info!("order canceled");
    Ok(committed)
}
