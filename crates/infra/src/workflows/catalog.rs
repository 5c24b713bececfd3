use serde_json::Value as JsonValue;

use gescom_core::{DomainError, RequestContext};
use gescom_events::{EventBus, EventEnvelope};
use gescom_products::{
    ChangePrices, CreateProduct, Product, ProductCommand, ProductDetails, ProductId, ProductPrices,
    SetProductActive, UpdateProductDetails,
};

use super::{decide, load_product, Committed};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, UnitOfWork};
use crate::event_store::EventStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub code: String,
    pub details: ProductDetails,
    pub prices: ProductPrices,
}

/// A partial update: either part may be left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductChanges {
    pub details: Option<ProductDetails>,
    pub prices: Option<ProductPrices>,
}

#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, product_id = %product_id))]
pub fn create_product<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    product_id: ProductId,
    product: NewProduct,
) -> Result<Committed<ProductId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let command = ProductCommand::CreateProduct(CreateProduct {
        tenant_id: ctx.tenant_id,
        product_id,
        code: product.code,
        details: product.details,
        prices: product.prices,
        actor: ctx.actor,
        occurred_at: ctx.now,
    });

    let events = dispatcher.dispatch(
        ctx.tenant_id,
        product_id.aggregate_id(),
        Product::AGGREGATE_TYPE,
        command,
        |_, id| Product::empty(ProductId::new(id)),
    )?;
    tracing::info!(events = events.len(), "product created");
    Ok(Committed::new(product_id, events))
}

/// Apply new details and/or prices in one append.
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, product_id = %product_id))]
pub fn update_product<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    product_id: ProductId,
    changes: ProductChanges,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    if changes.details.is_none() && changes.prices.is_none() {
        return Err(DomainError::invalid_input("nothing to update").into());
    }

    let events = dispatcher.with_retry("catalog.update_product", || {
        let mut product = load_product(dispatcher, ctx.tenant_id, product_id)?;
        let mut decided = Vec::new();

        if let Some(details) = &changes.details {
            decided.extend(decide(
                &mut product,
                &ProductCommand::UpdateProductDetails(UpdateProductDetails {
                    tenant_id: ctx.tenant_id,
                    product_id,
                    details: details.clone(),
                    actor: ctx.actor,
                    occurred_at: ctx.now,
                }),
            )?);
        }
        if let Some(prices) = changes.prices {
            decided.extend(decide(
                &mut product,
                &ProductCommand::ChangePrices(ChangePrices {
                    tenant_id: ctx.tenant_id,
                    product_id,
                    prices,
                    actor: ctx.actor,
                    occurred_at: ctx.now,
                }),
            )?);
        }

        let mut unit = UnitOfWork::new();
        unit.record(
            ctx.tenant_id,
            Product::AGGREGATE_TYPE,
            product_id.aggregate_id(),
            product.version,
            &decided,
        )?;
        dispatcher.commit(unit)
    })?;

    tracing::info!(events = events.len(), "product updated");
    Ok(Committed::new((), events))
}

#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, product_id = %product_id, active = active))]
pub fn set_product_active<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    product_id: ProductId,
    active: bool,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let command = ProductCommand::SetProductActive(SetProductActive {
        tenant_id: ctx.tenant_id,
        product_id,
        active,
        actor: ctx.actor,
        occurred_at: ctx.now,
    });

    let events = dispatcher.dispatch(
        ctx.tenant_id,
        product_id.aggregate_id(),
        Product::AGGREGATE_TYPE,
        command,
        |_, id| Product::empty(ProductId::new(id)),
    )?;
    Ok(Committed::new((), events))
}
