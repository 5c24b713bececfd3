//! Money/tax calculator.
//!
//! Pure functions turning priced lines, a discount and a tax rate into
//! subtotal / discount / tax / total, rounded half-up to two decimals.
//! Both the order and the invoice aggregates compute their amounts here.

pub mod totals;

pub use totals::{compute_totals, invoice_totals, order_subtotal, PricedLine, Totals};
