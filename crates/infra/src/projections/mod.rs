//! Read models built from domain events.
//!
//! Every projection is:
//! - **Rebuildable**: reconstructed from the event log at startup
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: safe for at-least-once delivery

pub mod activity_log;
pub mod aggregate_state;
pub mod clients;
pub mod cursor;
pub mod deliveries;
pub mod hub;
pub mod invoices;
pub mod products;
pub mod reports;
pub mod sales_orders;
pub mod stock;

pub use activity_log::{ActivityAction, ActivityEntry, ActivityFilter, ActivityLogProjection};
pub use clients::{ClientFilter, ClientView, ClientsProjection};
pub use cursor::{Applied, ProjectionError, StreamCursors};
pub use deliveries::{DeliveriesProjection, DeliveryView};
pub use hub::{ProjectionHub, RebuildStats};
pub use invoices::{InvoiceView, InvoicesProjection};
pub use products::{ProductView, ProductsProjection};
pub use reports::{CashRegisterReport, Dashboard, ProductStock, StockStats};
pub use sales_orders::{OrderLineView, OrderView, SalesOrdersProjection};
pub use stock::{StockLevel, StockProjection};
