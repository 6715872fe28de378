//! Order lifecycle and reconciliation.
//!
//! [`OrderService`] turns order requests into single atomic commits that
//! touch the order, every affected batch and the customer's running
//! totals. Edits and cancellations post compensating deltas computed
//! against the previously committed order.

pub mod customer;
pub mod order;
pub mod service;

pub use customer::{Customer, CustomerDelta, CustomerError, CustomerEvent, CustomerLedger};
pub use order::{
    CreateOrder, DeliveryAddress, EditLine, Order, OrderError, OrderEvent, OrderItem, OrderLine,
    OrderStatus, OrderTotals, PaymentMethod, PaymentStatus, StatusChange, UpdateOrder,
};
pub use service::OrderService;
