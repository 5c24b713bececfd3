//! Application workflows: load → decide → commit for every write operation.
//!
//! Single-stream operations go through [`CommandDispatcher::dispatch`].
//! Operations that touch several aggregates (placing an order with lines,
//! delivering, invoicing) decide on every aggregate in memory and commit one
//! [`UnitOfWork`](crate::command_dispatcher::UnitOfWork), so either all streams
//! move or none does. Each attempt runs inside
//! [`CommandDispatcher::with_retry`] and reloads everything it decides on.
//!
//! Workflows return the committed events so the caller can update the read
//! models before answering.

pub mod billing;
pub mod catalog;
pub mod clients;
pub mod fulfillment;
pub mod orders;
pub mod stock;

use gescom_clients::Client;
use gescom_core::{Aggregate, ClientId, DomainError, TenantId};
use gescom_events::EventEnvelope;
use gescom_products::{Product, ProductId};
use serde_json::Value as JsonValue;

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Loaded};
use crate::event_store::{EventStore, StoredEvent};

pub use billing::{cancel_invoice, create_invoice, record_payment, InvoiceRequest, PaymentRequest};
pub use catalog::{create_product, set_product_active, update_product, NewProduct, ProductChanges};
pub use clients::{register_client, set_client_active, update_client};
pub use fulfillment::{create_delivery, DeliveryDetails};
pub use orders::{
    add_line, cancel_order, confirm_order, place_order, remove_line, set_discount, NewLine, NewOrder,
};
pub use stock::{record_movement, MovementRequest};

/// What a workflow produced, plus the events it committed.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub events: Vec<StoredEvent>,
}

impl<T> Committed<T> {
    pub fn new(value: T, events: Vec<StoredEvent>) -> Self {
        Self { value, events }
    }
}

/// Load a product's catalog stream, failing with `NotFound` when it was never created.
pub(crate) fn load_product<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    product_id: ProductId,
) -> Result<Loaded<Product>, DispatchError>
where
    S: EventStore,
    B: gescom_events::EventBus<EventEnvelope<JsonValue>>,
{
    let loaded = dispatcher.load(tenant_id, Product::AGGREGATE_TYPE, product_id.aggregate_id(), |_, id| {
        Product::empty(ProductId::new(id))
    })?;
    if !loaded.aggregate.exists() {
        return Err(DomainError::NotFound.into());
    }
    Ok(loaded)
}

/// Load a client's stream, failing with `NotFound` when it was never registered.
pub(crate) fn load_client<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    client_id: ClientId,
) -> Result<Loaded<Client>, DispatchError>
where
    S: EventStore,
    B: gescom_events::EventBus<EventEnvelope<JsonValue>>,
{
    let loaded = dispatcher.load(tenant_id, Client::AGGREGATE_TYPE, client_id.aggregate_id(), |_, id| {
        Client::empty(ClientId::from(id))
    })?;
    if !loaded.aggregate.exists() {
        return Err(DomainError::NotFound.into());
    }
    Ok(loaded)
}

/// Decide a command on a loaded aggregate and apply the result in place.
pub(crate) fn decide<A>(loaded: &mut Loaded<A>, command: &A::Command) -> Result<Vec<A::Event>, DispatchError>
where
    A: Aggregate<Error = DomainError>,
{
    Ok(gescom_events::execute(&mut loaded.aggregate, command)?)
}
