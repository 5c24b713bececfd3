//! Sales domain module (event-sourced): orders and their deliveries.
//!
//! The order is a state machine
//! `PENDING → CONFIRMED → DELIVERED → INVOICED`, with `CANCELED` reachable only
//! from `PENDING` or `CONFIRMED`. Deterministic domain logic only; the stock and
//! invoice side effects of a transition are committed by the infrastructure
//! workflows together with the order events.

pub mod delivery;
pub mod order;

pub use delivery::{
    Delivery, DeliveryCommand, DeliveryEvent, DeliveryId, DeliveryLine, DeliveryRecorded,
    RecordDelivery,
};
pub use order::{
    AddLine, CancelOrder, ConfirmOrder, DiscountSet, LineAdded, LineRemoved, MarkDelivered,
    MarkInvoiced, OrderCanceled, OrderConfirmed, OrderDelivered, OrderInvoiced, OrderLine,
    OrderPlaced, PlaceOrder, RemoveLine, SalesOrder, SalesOrderCommand, SalesOrderEvent,
    SalesOrderId, SalesOrderStatus, SetDiscount,
};
