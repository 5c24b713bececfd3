use serde_json::Value as JsonValue;

use gescom_clients::{
    Client, ClientCommand, ClientDetails, RegisterClient, SetClientActive, UpdateClientDetails,
};
use gescom_core::{ClientId, RequestContext};
use gescom_events::{EventBus, EventEnvelope};

use super::Committed;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

fn dispatch_client<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    client_id: ClientId,
    command: ClientCommand,
) -> Result<Committed<ClientId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let events = dispatcher.dispatch(
        ctx.tenant_id,
        client_id.aggregate_id(),
        Client::AGGREGATE_TYPE,
        command,
        |_, id| Client::empty(ClientId::from(id)),
    )?;
    Ok(Committed::new(client_id, events))
}

#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, client_id = %client_id))]
pub fn register_client<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    client_id: ClientId,
    details: ClientDetails,
) -> Result<Committed<ClientId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let committed = dispatch_client(
        dispatcher,
        ctx,
        client_id,
        ClientCommand::RegisterClient(RegisterClient {
            tenant_id: ctx.tenant_id,
            client_id,
            details,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )?;
    tracing::info!("client registered");
    Ok(committed)
}

#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, client_id = %client_id))]
pub fn update_client<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    client_id: ClientId,
    details: ClientDetails,
) -> Result<Committed<ClientId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatch_client(
        dispatcher,
        ctx,
        client_id,
        ClientCommand::UpdateClientDetails(UpdateClientDetails {
            tenant_id: ctx.tenant_id,
            client_id,
            details,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )
}

#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, client_id = %client_id, active = active))]
pub fn set_client_active<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    client_id: ClientId,
    active: bool,
) -> Result<Committed<ClientId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatch_client(
        dispatcher,
        ctx,
        client_id,
        ClientCommand::SetClientActive(SetClientActive {
            tenant_id: ctx.tenant_id,
            client_id,
            active,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )
}
