//! Order domain events.

use chrono::{DateTime, Utc};
use domain::{CustomerId, DomainEvent, Money, OrderId};
use serde::{Deserialize, Serialize};

use super::{DeliveryAddress, OrderItem, OrderStatus, PaymentMethod, PaymentStatus};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed with priced, batch-bound lines.
    OrderPlaced(OrderPlacedData),

    /// The line list of a pending order was replaced.
    ItemsRevised(ItemsRevisedData),

    StatusChanged(StatusChangedData<OrderStatus>),

    PaymentStatusChanged(StatusChangedData<PaymentStatus>),

    /// Order was cancelled and its stock returned.
    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::ItemsRevised(_) => "ItemsRevised",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::PaymentStatusChanged(_) => "PaymentStatusChanged",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }

    fn tags(&self) -> Vec<(&'static str, String)> {
        match self {
            OrderEvent::OrderPlaced(data) => vec![("customer_id", data.customer_id.to_string())],
            _ => Vec::new(),
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub delivery_fee: Money,
    pub payment_method: PaymentMethod,
    pub delivery_address: DeliveryAddress,
    pub placed_at: DateTime<Utc>,
}

/// Data for ItemsRevised event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsRevisedData {
    /// The complete new line list.
    pub items: Vec<OrderItem>,
    pub revised_at: DateTime<Utc>,
}

/// Data for StatusChanged and PaymentStatusChanged events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData<S> {
    pub from: S,
    pub to: S,
    pub changed_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    /// Outside the transition table.
    #[serde(default)]
    pub overridden: bool,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}
