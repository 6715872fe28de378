//! Customer aggregate.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, CustomerId, Money, OrderId, SnapshotCapable};
use event_store::Version;
use serde::{Deserialize, Serialize};

use super::{
    CustomerError, CustomerEvent,
    events::{CustomerRegisteredData, TotalsPostedData},
};

/// A signed change to a customer's running totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDelta {
    pub orders_delta: i32,
    pub spent_delta: Money,
    pub order_id: Option<OrderId>,
    pub reason: String,
}

impl CustomerDelta {
    pub fn new(orders_delta: i32, spent_delta: Money, reason: impl Into<String>) -> Self {
        Self {
            orders_delta,
            spent_delta,
            order_id: None,
            reason: reason.into(),
        }
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// One more order worth `total`.
    pub fn order_placed(order_id: OrderId, total: Money) -> Self {
        Self::new(1, total, "order placed").for_order(order_id)
    }

    /// The order no longer counts.
    pub fn order_cancelled(order_id: OrderId, total: Money) -> Self {
        Self::new(-1, -total, "order cancelled").for_order(order_id)
    }

    /// The order's total moved from `old_total` to `new_total`.
    pub fn order_revised(order_id: OrderId, old_total: Money, new_total: Money) -> Self {
        Self::new(0, new_total - old_total, "order revised").for_order(order_id)
    }

    pub fn is_zero(&self) -> bool {
        self.orders_delta == 0 && self.spent_delta.is_zero()
    }
}

/// Running order count and spend, maintained by postings only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    id: Option<CustomerId>,

    #[serde(default)]
    version: Version,

    name: String,
    email: String,
    total_orders: u32,
    total_spent: Money,
    registered_at: Option<DateTime<Utc>>,
}

impl Aggregate for Customer {
    type Event = CustomerEvent;
    type Error = CustomerError;

    fn aggregate_type() -> &'static str {
        "Customer"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id.map(Into::into)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(data) => {
                self.id = Some(data.customer_id);
                self.name = data.name;
                self.email = data.email;
                self.registered_at = Some(data.registered_at);
            }
            CustomerEvent::TotalsPosted(data) => {
                let orders = i64::from(self.total_orders) + i64::from(data.orders_delta);
                self.total_orders = u32::try_from(orders).unwrap_or(0);
                self.total_spent += data.spent_delta;
            }
        }
    }
}

impl SnapshotCapable for Customer {}

impl Customer {
    pub fn customer_id(&self) -> Option<CustomerId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn total_orders(&self) -> u32 {
        self.total_orders
    }

    pub fn total_spent(&self) -> Money {
        self.total_spent
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }
}

impl Customer {
    pub fn register(
        &self,
        customer_id: CustomerId,
        name: &str,
        email: &str,
        registered_at: DateTime<Utc>,
    ) -> Result<Vec<CustomerEvent>, CustomerError> {
        if let Some(id) = self.id {
            return Err(CustomerError::AlreadyRegistered(id));
        }
        if name.trim().is_empty() {
            return Err(CustomerError::Invalid("name is required".into()));
        }
        if !email.contains('@') {
            return Err(CustomerError::Invalid(format!("malformed email {email:?}")));
        }

        Ok(vec![CustomerEvent::CustomerRegistered(
            CustomerRegisteredData {
                customer_id,
                name: name.trim().to_string(),
                email: email.trim().to_string(),
                registered_at,
            },
        )])
    }

    /// A zero delta yields no events. Totals never go below zero.
    pub fn post(
        &self,
        delta: CustomerDelta,
        posted_at: DateTime<Utc>,
    ) -> Result<Vec<CustomerEvent>, CustomerError> {
        if self.id.is_none() {
            return Err(CustomerError::NotRegistered);
        }
        if delta.is_zero() {
            return Ok(vec![]);
        }

        let total_orders = i64::from(self.total_orders) + i64::from(delta.orders_delta);
        let Some(total_spent) = self.total_spent.checked_add(delta.spent_delta) else {
            return Err(CustomerError::Invalid(format!(
                "total spent {} cannot absorb {}",
                self.total_spent, delta.spent_delta
            )));
        };
        if total_orders < 0 || total_spent.is_negative() {
            return Err(CustomerError::NegativeTotals {
                total_orders,
                total_spent,
            });
        }

        Ok(vec![CustomerEvent::TotalsPosted(TotalsPostedData {
            orders_delta: delta.orders_delta,
            spent_delta: delta.spent_delta,
            order_id: delta.order_id,
            reason: delta.reason,
            posted_at,
        })])
    }
}
