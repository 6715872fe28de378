//! Customer domain events.

use chrono::{DateTime, Utc};
use domain::{CustomerId, DomainEvent, Money, OrderId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegisteredData),

    /// A signed change to the running totals.
    TotalsPosted(TotalsPostedData),
}

impl DomainEvent for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "CustomerRegistered",
            CustomerEvent::TotalsPosted(_) => "TotalsPosted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRegisteredData {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalsPostedData {
    pub orders_delta: i32,
    pub spent_delta: Money,
    /// The order whose lifecycle step caused the posting.
    pub order_id: Option<OrderId>,
    pub reason: String,
    pub posted_at: DateTime<Utc>,
}
