//! Human-readable document numbers (`CMD-20240131-4F2A9C01B3D5`).

use chrono::{DateTime, Utc};

use crate::id::AggregateId;

/// Prefix used for sales order numbers.
pub const ORDER_PREFIX: &str = "CMD";
/// Prefix used for delivery notes.
pub const DELIVERY_PREFIX: &str = "LIV";
/// Prefix used for invoices.
pub const INVOICE_PREFIX: &str = "FACT";

/// Random bytes of the id rendered in the suffix (48 bits, 12 hex digits).
const SUFFIX_BYTES: usize = 6;

/// Build a document number from a prefix, the business date and the aggregate id.
///
/// The suffix is the last 48 bits of the (v7) id, which are all random, so
/// numbers are stable across replays and do not need a shared counter.
/// Callers that need a hard guarantee check the number against their read model.
pub fn document_number(prefix: &str, at: DateTime<Utc>, id: &AggregateId) -> String {
    let bytes = id.as_uuid().as_bytes();
    let suffix: String = bytes[bytes.len() - SUFFIX_BYTES..]
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect();
    format!("{prefix}-{}-{suffix}", at.format("%Y%m%d"))
}
