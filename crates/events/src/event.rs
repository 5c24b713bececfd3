use chrono::{DateTime, Utc};

/// A domain event.
///
/// Events are immutable facts ("stock.movement_recorded", "sales.order.confirmed"),
/// versioned for schema evolution, and only ever appended to a stream.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "invoicing.invoice.payment_recorded").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time, supplied by the command).
    fn occurred_at(&self) -> DateTime<Utc>;
}
