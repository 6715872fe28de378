//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod status;
mod value_objects;

pub use aggregate::Order;
pub use commands::{CreateOrder, EditLine, OrderLine, UpdateOrder};
pub use events::{
    ItemsRevisedData, OrderCancelledData, OrderEvent, OrderPlacedData, StatusChangedData,
};
pub use status::{OrderStatus, PaymentStatus, StatusChange};
pub use value_objects::{DeliveryAddress, OrderItem, OrderTotals, PaymentMethod};

use domain::{DomainError, OrderId, ProductId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order {0} has already been placed")]
    AlreadyPlaced(OrderId),

    #[error("Order has not been placed")]
    NotPlaced,

    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    #[error("Delivery address is missing {0}")]
    IncompleteAddress(&'static str),

    #[error("Delivery fee must not be negative")]
    NegativeDeliveryFee,

    #[error("Order amounts exceed the representable range")]
    AmountOutOfRange,

    /// Edits and cancellations need a pending, unsettled cash-on-delivery order.
    #[error("Order cannot be modified: {0}")]
    NotModifiable(String),

    #[error("Cannot move {kind} status from {from} to {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },
}

impl From<OrderError> for DomainError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::IncompleteAddress(_)
            | OrderError::NegativeDeliveryFee
            | OrderError::AmountOutOfRange => DomainError::Validation(e.to_string()),
            OrderError::AlreadyPlaced(_)
            | OrderError::NotPlaced
            | OrderError::NotModifiable(_)
            | OrderError::InvalidTransition { .. } => DomainError::InvalidState(e.to_string()),
        }
    }
}
