//! Inventory domain module (event-sourced).
//!
//! One stock ledger per product: an append-only chain of movements plus the
//! cached on-hand quantity. Deterministic domain logic only (no IO, no HTTP,
//! no storage).

pub mod alerts;
pub mod ledger;
pub mod movement;

pub use alerts::{stock_status, StockStatus};
pub use ledger::{
    replay_quantity, MovementHistory, MovementOutcome, RecordMovement, StockCommand, StockEvent,
    StockLedger,
};
pub use movement::{MovementDirection, MovementQuantity, MovementType, StockMovement};
