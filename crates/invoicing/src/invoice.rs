use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gescom_core::numbering::{document_number, INVOICE_PREFIX};
use gescom_core::{Aggregate, AggregateRoot, DomainError, Money, TaxRate, TenantId, UserId};
use gescom_events::Event;
use gescom_pricing::{invoice_totals, Totals};
use gescom_sales::SalesOrderId;

gescom_core::aggregate_id_newtype!(
    /// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InvoiceId
);

/// Invoice status. Everything but `Canceled` is derived from the paid amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Canceled,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "UNPAID",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Canceled => "CANCELED",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNPAID" => Ok(InvoiceStatus::Unpaid),
            "PARTIALLY_PAID" => Ok(InvoiceStatus::PartiallyPaid),
            "PAID" => Ok(InvoiceStatus::Paid),
            "CANCELED" => Ok(InvoiceStatus::Canceled),
            other => Err(DomainError::invalid_input(format!("unknown invoice status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    BankTransfer,
    Check,
    MobilePayment,
}

/// A payment recorded against an invoice. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_on: NaiveDate,
    pub reference: Option<String>,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    invoice_number: String,
    order_id: Option<SalesOrderId>,
    invoice_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    tax_rate: TaxRate,
    totals: Totals,
    paid_amount: Money,
    payments: Vec<Payment>,
    canceled: bool,
    version: u64,
    created: bool,
}

impl Invoice {
    pub const AGGREGATE_TYPE: &'static str = "invoicing.invoice";

    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            invoice_number: String::new(),
            order_id: None,
            invoice_date: None,
            due_date: None,
            tax_rate: TaxRate::zero(),
            totals: Totals {
                subtotal: Money::zero(),
                discount: Money::zero(),
                tax_amount: Money::zero(),
                total: Money::zero(),
            },
            paid_amount: Money::zero(),
            payments: Vec::new(),
            canceled: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn order_id(&self) -> Option<SalesOrderId> {
        self.order_id
    }

    pub fn invoice_date(&self) -> Option<NaiveDate> {
        self.invoice_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn total_amount(&self) -> Money {
        self.totals.total
    }

    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// `total − paid`; never negative since payments are capped at the total.
    pub fn outstanding_amount(&self) -> Money {
        self.totals
            .total
            .checked_sub(self.paid_amount)
            .unwrap_or_default()
    }

    pub fn status(&self) -> InvoiceStatus {
        if self.canceled {
            InvoiceStatus::Canceled
        } else if self.paid_amount >= self.totals.total {
            InvoiceStatus::Paid
        } else if self.paid_amount.is_zero() {
            InvoiceStatus::Unpaid
        } else {
            InvoiceStatus::PartiallyPaid
        }
    }

    /// Past its due date and still expecting money.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.due_date {
            Some(due) => {
                due < today
                    && !matches!(self.status(), InvoiceStatus::Paid | InvoiceStatus::Canceled)
            }
            None => false,
        }
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
///
/// Subtotal and discount come from the delivered order; tax is applied here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub order_id: SalesOrderId,
    pub subtotal: Money,
    pub discount: Money,
    pub tax_rate: TaxRate,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_on: NaiveDate,
    pub reference: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    RecordPayment(RecordPayment),
    CancelInvoice(CancelInvoice),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub order_id: SalesOrderId,
    pub tax_rate: TaxRate,
    pub totals: Totals,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    /// Paid amount after this payment.
    pub paid_amount: Money,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCanceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCanceled {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    PaymentRecorded(PaymentRecorded),
    InvoiceCanceled(InvoiceCanceled),
}

impl InvoiceEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.tenant_id,
            InvoiceEvent::PaymentRecorded(e) => e.tenant_id,
            InvoiceEvent::InvoiceCanceled(e) => e.tenant_id,
        }
    }

    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.invoice_id,
            InvoiceEvent::PaymentRecorded(e) => e.invoice_id,
            InvoiceEvent::InvoiceCanceled(e) => e.invoice_id,
        }
    }
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRecorded(_) => "invoicing.invoice.payment_recorded",
            InvoiceEvent::InvoiceCanceled(_) => "invoicing.invoice.canceled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::PaymentRecorded(e) => e.occurred_at,
            InvoiceEvent::InvoiceCanceled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.invoice_number = e.invoice_number.clone();
                self.order_id = Some(e.order_id);
                self.tax_rate = e.tax_rate;
                self.totals = e.totals;
                self.invoice_date = Some(e.invoice_date);
                self.due_date = Some(e.due_date);
                self.paid_amount = Money::zero();
                self.payments.clear();
                self.canceled = false;
                self.created = true;
            }
            InvoiceEvent::PaymentRecorded(e) => {
                self.payments.push(e.payment.clone());
                self.paid_amount = e.paid_amount;
            }
            InvoiceEvent::InvoiceCanceled(_) => {
                self.canceled = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            InvoiceCommand::CancelInvoice(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Invoice {
    fn ensure_exists(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.due_date < cmd.invoice_date {
            return Err(DomainError::invalid_input(format!(
                "due date {} is before invoice date {}",
                cmd.due_date, cmd.invoice_date
            )));
        }

        let totals = invoice_totals(cmd.subtotal, cmd.discount, cmd.tax_rate)?;

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            invoice_number: document_number(
                INVOICE_PREFIX,
                cmd.occurred_at,
                &cmd.invoice_id.aggregate_id(),
            ),
            order_id: cmd.order_id,
            tax_rate: cmd.tax_rate,
            totals,
            invoice_date: cmd.invoice_date,
            due_date: cmd.due_date,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(
        &self,
        cmd: &RecordPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;

        if cmd.amount.is_zero() {
            return Err(DomainError::invalid_input("payment amount must be positive"));
        }
        if self.canceled {
            return Err(DomainError::invariant("cannot record a payment on a canceled invoice"));
        }

        let outstanding = self.outstanding_amount();
        if cmd.amount > outstanding {
            return Err(DomainError::OverPayment {
                amount: cmd.amount.to_string(),
                outstanding: outstanding.to_string(),
            });
        }

        let paid_amount = self.paid_amount.checked_add(cmd.amount)?;

        Ok(vec![InvoiceEvent::PaymentRecorded(PaymentRecorded {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            payment: Payment {
                amount: cmd.amount,
                method: cmd.method,
                paid_on: cmd.paid_on,
                reference: cmd.reference.clone(),
            },
            paid_amount,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.invoice_id)?;

        match self.status() {
            InvoiceStatus::Canceled => {
                return Err(DomainError::conflict("invoice is already canceled"));
            }
            InvoiceStatus::Paid => {
                return Err(DomainError::invariant("cannot cancel a paid invoice"));
            }
            InvoiceStatus::Unpaid | InvoiceStatus::PartiallyPaid => {}
        }

        Ok(vec![InvoiceEvent::InvoiceCanceled(InvoiceCanceled {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
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

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn rate(s: &str) -> TaxRate {
        TaxRate::new(gescom_core::Decimal::from_str(s).unwrap()).unwrap()
    }

    fn issued(subtotal: &str, tax: &str) -> (TenantId, InvoiceId, Invoice) {
        let tenant_id = test_tenant_id();
        let invoice_id = InvoiceId::generate();
        let mut invoice = Invoice::empty(invoice_id);
        execute(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id,
                invoice_id,
                order_id: SalesOrderId::generate(),
                subtotal: money(subtotal),
                discount: Money::zero(),
                tax_rate: rate(tax),
                invoice_date: date(2024, 3, 1),
                due_date: date(2024, 3, 31),
                actor: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (tenant_id, invoice_id, invoice)
    }

    fn pay(tenant_id: TenantId, invoice_id: InvoiceId, amount: &str) -> InvoiceCommand {
        InvoiceCommand::RecordPayment(RecordPayment {
            tenant_id,
            invoice_id,
            amount: money(amount),
            method: PaymentMethod::BankTransfer,
            paid_on: date(2024, 3, 10),
            reference: None,
            actor: None,
            occurred_at: test_time(),
        })
    }

    fn cancel(tenant_id: TenantId, invoice_id: InvoiceId) -> InvoiceCommand {
        InvoiceCommand::CancelInvoice(CancelInvoice {
            tenant_id,
            invoice_id,
            reason: None,
            actor: None,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn issue_invoice_applies_tax_and_numbers_it() {
        let (_, _, invoice) = issued("35.00", "20");
        assert_eq!(invoice.totals().tax_amount, money("7.00"));
        assert_eq!(invoice.total_amount(), money("42.00"));
        assert_eq!(invoice.status(), InvoiceStatus::Unpaid);
        assert!(invoice.invoice_number().starts_with("FACT-"));
    }

    #[test]
    fn due_date_before_invoice_date_is_invalid() {
        let invoice_id = InvoiceId::generate();
        let invoice = Invoice::empty(invoice_id);
        let err = invoice
            .handle(&InvoiceCommand::IssueInvoice(IssueInvoice {
                tenant_id: test_tenant_id(),
                invoice_id,
                order_id: SalesOrderId::generate(),
                subtotal: money("10"),
                discount: Money::zero(),
                tax_rate: TaxRate::zero(),
                invoice_date: date(2024, 3, 1),
                due_date: date(2024, 2, 28),
                actor: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn zero_total_invoice_is_paid_at_issue() {
        let (_, _, invoice) = issued("0", "20");
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
    }

    #[test]
    fn partial_then_full_payment() {
        let (tenant_id, invoice_id, mut invoice) = issued("100.00", "0");

        execute(&mut invoice, &pay(tenant_id, invoice_id, "60.00")).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.paid_amount(), money("60.00"));
        assert_eq!(invoice.outstanding_amount(), money("40.00"));

        execute(&mut invoice, &pay(tenant_id, invoice_id, "40.00")).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.payments().len(), 2);
    }

    #[test]
    fn overpayment_is_rejected_and_paid_unchanged() {
        let (tenant_id, invoice_id, mut invoice) = issued("100.00", "0");
        execute(&mut invoice, &pay(tenant_id, invoice_id, "60.00")).unwrap();

        let err = execute(&mut invoice, &pay(tenant_id, invoice_id, "40.01")).unwrap_err();
        assert_eq!(
            err,
            DomainError::OverPayment {
                amount: "40.01".to_string(),
                outstanding: "40.00".to_string(),
            }
        );
        assert_eq!(invoice.paid_amount(), money("60.00"));
    }

    #[test]
    fn zero_payment_is_invalid() {
        let (tenant_id, invoice_id, invoice) = issued("10.00", "0");
        let err = invoice.handle(&pay(tenant_id, invoice_id, "0")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn canceled_invoice_rejects_payments() {
        let (tenant_id, invoice_id, mut invoice) = issued("10.00", "0");
        execute(&mut invoice, &cancel(tenant_id, invoice_id)).unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Canceled);

        let err = invoice.handle(&pay(tenant_id, invoice_id, "1.00")).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(matches!(
            invoice.handle(&cancel(tenant_id, invoice_id)),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn paid_invoice_cannot_be_canceled() {
        let (tenant_id, invoice_id, mut invoice) = issued("10.00", "0");
        execute(&mut invoice, &pay(tenant_id, invoice_id, "10.00")).unwrap();

        match invoice.handle(&cancel(tenant_id, invoice_id)).unwrap_err() {
            DomainError::InvariantViolation(msg) if msg.contains("paid") => {}
            other => panic!("expected invariant violation, got {other:?}"),
        }
    }

    #[test]
    fn overdue_only_while_money_is_expected() {
        let (tenant_id, invoice_id, mut invoice) = issued("10.00", "0");
        assert!(!invoice.is_overdue(date(2024, 3, 31)));
        assert!(invoice.is_overdue(date(2024, 4, 1)));

        execute(&mut invoice, &pay(tenant_id, invoice_id, "10.00")).unwrap();
        assert!(!invoice.is_overdue(date(2024, 4, 1)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Paid amount never decreases and never exceeds the total; rejected
            /// payments leave it unchanged.
            #[test]
            fn paid_amount_is_monotonic(payments in prop::collection::vec(1u64..5_000, 0..20)) {
                let (tenant_id, invoice_id, mut invoice) = issued("100.00", "0");

                for cents in payments {
                    let before = invoice.paid_amount();
                    let amount = Money::from_cents(cents).to_string();
                    match execute(&mut invoice, &pay(tenant_id, invoice_id, &amount)) {
                        Ok(_) => prop_assert!(invoice.paid_amount() > before),
                        Err(DomainError::OverPayment { .. }) => {
                            prop_assert_eq!(invoice.paid_amount(), before)
                        }
                        Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                    }
                    prop_assert!(invoice.paid_amount() <= invoice.total_amount());
                }
            }
        }
    }
}
