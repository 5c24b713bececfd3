use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value as JsonValue;

use gescom_core::{DomainError, Money, TaxRate, TenantId};
use gescom_events::EventEnvelope;
use gescom_invoicing::{Invoice, InvoiceEvent, InvoiceId, InvoiceIssued, InvoiceStatus, Payment};
use gescom_sales::SalesOrderId;

use super::aggregate_state::{AggregateStateProjection, StateEntry};
use super::cursor::{decode, Applied, ProjectionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceView {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub order_id: Option<SalesOrderId>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub tax_rate: TaxRate,
    pub subtotal: Money,
    pub discount: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub outstanding_amount: Money,
    pub status: InvoiceStatus,
    pub payments: Vec<Payment>,
}

impl InvoiceView {
    fn from_invoice(invoice: &Invoice) -> Result<Self, DomainError> {
        let totals = invoice.totals();
        Ok(Self {
            invoice_id: invoice.id_typed(),
            invoice_number: invoice.invoice_number().to_string(),
            order_id: invoice.order_id(),
            invoice_date: invoice.invoice_date(),
            due_date: invoice.due_date(),
            tax_rate: invoice.tax_rate(),
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax_amount: totals.tax_amount,
            total_amount: totals.total,
            paid_amount: invoice.paid_amount(),
            outstanding_amount: invoice.outstanding_amount(),
            status: invoice.status(),
            payments: invoice.payments().to_vec(),
        })
    }
}

#[derive(Debug)]
pub struct InvoicesProjection {
    inner: AggregateStateProjection<Invoice, InvoiceView>,
}

impl Default for InvoicesProjection {
    fn default() -> Self {
        Self {
            inner: AggregateStateProjection::new(
                Invoice::AGGREGATE_TYPE,
                |id| Invoice::empty(InvoiceId::new(id)),
                InvoiceView::from_invoice,
            ),
        }
    }
}

impl InvoicesProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Option<InvoiceView> {
        self.inner.get(tenant_id, invoice_id.aggregate_id()).map(|e| e.view)
    }

    /// Invoice numbers are unique per tenant; lookup ignores case and surrounding blanks.
    pub fn find_by_number(&self, tenant_id: TenantId, invoice_number: &str) -> Option<InvoiceView> {
        let invoice_number = invoice_number.trim();
        self.inner
            .list(tenant_id)
            .into_iter()
            .map(|e| e.view)
            .find(|i| i.invoice_number.eq_ignore_ascii_case(invoice_number))
    }

    /// Invoices newest first, optionally restricted to one status.
    pub fn list(&self, tenant_id: TenantId, status: Option<InvoiceStatus>) -> Vec<InvoiceView> {
        let mut invoices: Vec<InvoiceView> = self
            .inner
            .list(tenant_id)
            .into_iter()
            .map(|e| e.view)
            .filter(|i| status.is_none_or(|s| i.status == s))
            .collect();
        invoices.sort_by(|a, b| {
            b.invoice_date
                .cmp(&a.invoice_date)
                .then(b.invoice_number.cmp(&a.invoice_number))
        });
        invoices
    }

    /// Unpaid or partially paid invoices past their due date, oldest due first.
    pub fn overdue(&self, tenant_id: TenantId, today: NaiveDate) -> Vec<InvoiceView> {
        let mut overdue: Vec<InvoiceView> = self
            .inner
            .list(tenant_id)
            .into_iter()
            .filter(|StateEntry { aggregate, .. }| aggregate.is_overdue(today))
            .map(|e| e.view)
            .collect();
        overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        overdue
    }

    /// Σ outstanding over invoices that are not canceled.
    pub fn outstanding_total(&self, tenant_id: TenantId) -> Result<Money, DomainError> {
        self.inner
            .list(tenant_id)
            .into_iter()
            .filter(|e| e.view.status != InvoiceStatus::Canceled)
            .try_fold(Money::zero(), |acc, e| acc.checked_add(e.view.outstanding_amount))
    }

    /// Fold an invoice event in. An issue that reuses another invoice's number is refused.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        if envelope.aggregate_type() == Invoice::AGGREGATE_TYPE {
            if let InvoiceEvent::InvoiceIssued(issued) = decode(envelope, InvoiceEvent::tenant_id)? {
                self.ensure_number_free(envelope.tenant_id(), &issued)?;
            }
        }
        self.inner.apply_envelope(envelope)
    }

    fn ensure_number_free(&self, tenant_id: TenantId, issued: &InvoiceIssued) -> Result<(), ProjectionError> {
        match self.find_by_number(tenant_id, &issued.invoice_number) {
            Some(existing) if existing.invoice_id != issued.invoice_id => Err(ProjectionError::Invalid(format!(
                "invoice number {} is already used by invoice {}",
                issued.invoice_number, existing.invoice_id
            ))),
            _ => Ok(()),
        }
    }

    pub fn reset(&self) {
        self.inner.reset();
    }
}
