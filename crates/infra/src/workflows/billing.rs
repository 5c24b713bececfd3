use chrono::{Days, NaiveDate};
use serde_json::Value as JsonValue;

use gescom_core::{DomainError, Money, RequestContext, TaxRate};
use gescom_events::{EventBus, EventEnvelope};
use gescom_invoicing::{
    CancelInvoice, Invoice, InvoiceCommand, InvoiceId, IssueInvoice, PaymentMethod, RecordPayment,
};
use gescom_sales::{MarkInvoiced, SalesOrder, SalesOrderCommand, SalesOrderId};

use super::{decide, Committed};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, UnitOfWork};
use crate::event_store::EventStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub tax_rate: TaxRate,
    /// Defaults to the invoice date plus the configured payment term.
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub amount: Money,
    pub method: PaymentMethod,
    /// Defaults to the business date of the request.
    pub paid_on: Option<NaiveDate>,
    pub reference: Option<String>,
}

/// Invoice a DELIVERED order.
///
/// The order moves to INVOICED and the invoice is issued in the same batch, so
/// two concurrent requests for the same order can never both succeed: the
/// loser retries, sees an INVOICED order and fails with `DuplicateInvoice`.
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id, invoice_id = %invoice_id))]
pub fn create_invoice<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    order_id: SalesOrderId,
    invoice_id: InvoiceId,
    request: InvoiceRequest,
    default_due_days: u32,
) -> Result<Committed<InvoiceId>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let tenant_id = ctx.tenant_id;
    let invoice_date = ctx.today();
    let due_date = match request.due_date {
        Some(due) => due,
        None => invoice_date
            .checked_add_days(Days::new(u64::from(default_due_days)))
            .ok_or_else(|| DomainError::invalid_input("due date out of range"))?,
    };

    let events = dispatcher.with_retry("billing.create_invoice", || {
        let mut order = dispatcher.load(tenant_id, SalesOrder::AGGREGATE_TYPE, order_id.aggregate_id(), |_, id| {
            SalesOrder::empty(SalesOrderId::new(id))
        })?;
        let order_events = decide(
            &mut order,
            &SalesOrderCommand::MarkInvoiced(MarkInvoiced {
                tenant_id,
                order_id,
                invoice_id: invoice_id.aggregate_id(),
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;

        let mut invoice = dispatcher.load(tenant_id, Invoice::AGGREGATE_TYPE, invoice_id.aggregate_id(), |_, id| {
            Invoice::empty(InvoiceId::new(id))
        })?;
        let invoice_events = decide(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                order_id,
                subtotal: order.aggregate.subtotal()?,
                discount: order.aggregate.discount(),
                tax_rate: request.tax_rate,
                invoice_date,
                due_date,
                actor: ctx.actor,
                occurred_at: ctx.now,
            }),
        )?;

        let mut unit = UnitOfWork::new();
        unit.record(tenant_id, SalesOrder::AGGREGATE_TYPE, order_id.aggregate_id(), order.version, &order_events)?;
        unit.record(
            tenant_id,
            Invoice::AGGREGATE_TYPE,
            invoice_id.aggregate_id(),
            invoice.version,
            &invoice_events,
        )?;
        dispatcher.commit(unit)
    })?;

    tracing::info!(%due_date, "invoice issued");
    Ok(Committed::new(invoice_id, events))
}

fn dispatch_invoice<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    invoice_id: InvoiceId,
    command: InvoiceCommand,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let events = dispatcher.dispatch(
        ctx.tenant_id,
        invoice_id.aggregate_id(),
        Invoice::AGGREGATE_TYPE,
        command,
        |_, id| Invoice::empty(InvoiceId::new(id)),
    )?;
    Ok(Committed::new((), events))
}

#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id, amount = %payment.amount))]
pub fn record_payment<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    invoice_id: InvoiceId,
    payment: PaymentRequest,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let committed = dispatch_invoice(
        dispatcher,
        ctx,
        invoice_id,
        InvoiceCommand::RecordPayment(RecordPayment {
            tenant_id: ctx.tenant_id,
            invoice_id,
            amount: payment.amount,
            method: payment.method,
            paid_on: payment.paid_on.unwrap_or_else(|| ctx.today()),
            reference: payment.reference,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )?;
    tracing::info!("payment recorded");
    Ok(committed)
}

/// Cancel an invoice. The order keeps its INVOICED status.
#[tracing::instrument(skip_all, fields(tenant_id = %ctx.tenant_id, invoice_id = %invoice_id))]
pub fn cancel_invoice<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: &RequestContext,
    invoice_id: InvoiceId,
    reason: Option<String>,
) -> Result<Committed<()>, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let committed = dispatch_invoice(
        dispatcher,
        ctx,
        invoice_id,
        InvoiceCommand::CancelInvoice(CancelInvoice {
            tenant_id: ctx.tenant_id,
            invoice_id,
            reason,
            actor: ctx.actor,
            occurred_at: ctx.now,
        }),
    )?;
    tracing::info!("invoice canceled");
    Ok(committed)
}
