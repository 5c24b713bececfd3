//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (malformed input,
/// ledger guards, lifecycle guards). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (negative money, out-of-range tax rate, empty order, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An outbound stock movement asked for more than is on hand.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    /// The order is in a state where the requested edit or transition is illegal.
    #[error("order locked: {0}")]
    OrderLocked(String),

    /// Invoicing requires a delivered order.
    #[error("order not delivered")]
    OrderNotDelivered,

    /// An invoice already references the order.
    #[error("duplicate invoice for order")]
    DuplicateInvoice,

    /// The payment would push the paid amount above the invoice total.
    #[error("overpayment: amount {amount} exceeds outstanding {outstanding}")]
    OverPayment { amount: String, outstanding: String },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn order_locked(msg: impl Into<String>) -> Self {
        Self::OrderLocked(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable machine-readable code, used by the HTTP layer and logs.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidInput(_) => "invalid_input",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::OrderLocked(_) => "order_locked",
            DomainError::OrderNotDelivered => "order_not_delivered",
            DomainError::DuplicateInvoice => "duplicate_invoice",
            DomainError::OverPayment { .. } => "over_payment",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound => "not_found",
            DomainError::Conflict(_) => "conflict",
        }
    }
}
