//! Invoicing domain module (event-sourced).
//!
//! One invoice per delivered order; payments accumulate against it and the
//! status is derived from the paid amount. Deterministic domain logic only
//! (no IO, no HTTP, no storage).

pub mod invoice;

pub use invoice::{
    CancelInvoice, Invoice, InvoiceCanceled, InvoiceCommand, InvoiceEvent, InvoiceId,
    InvoiceIssued, InvoiceStatus, IssueInvoice, Payment, PaymentMethod, PaymentRecorded,
    RecordPayment,
};
