//! Order aggregate implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    Aggregate, BatchId, CustomerId, Money, OrderId, SnapshotCapable, TransitionPolicy,
};
use event_store::Version;
use serde::{Deserialize, Serialize};

use super::{
    DeliveryAddress, OrderError, OrderEvent, OrderItem, OrderStatus, OrderTotals, PaymentMethod,
    PaymentStatus, StatusChange,
    events::{ItemsRevisedData, OrderCancelledData, OrderPlacedData, StatusChangedData},
};

/// Order aggregate root.
///
/// Totals are always recomputed from the lines, so
/// `total == subtotal - discount + delivery_fee` holds after every event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,

    #[serde(default)]
    version: Version,

    customer_id: CustomerId,
    items: Vec<OrderItem>,
    totals: OrderTotals,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    payment_status_history: Vec<StatusChange<PaymentStatus>>,
    delivery_address: DeliveryAddress,
    status: OrderStatus,
    status_history: Vec<StatusChange<OrderStatus>>,
    created_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
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
            OrderEvent::OrderPlaced(data) => self.apply_placed(data),
            OrderEvent::ItemsRevised(data) => self.apply_revised(data),
            OrderEvent::StatusChanged(data) => self.apply_status_changed(data),
            OrderEvent::PaymentStatusChanged(data) => {
                self.payment_status = data.to;
                self.payment_status_history.push(StatusChange {
                    status: data.to,
                    at: data.changed_at,
                    note: data.note,
                    overridden: data.overridden,
                });
            }
            OrderEvent::OrderCancelled(data) => self.apply_cancelled(data),
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Order {
    pub fn order_id(&self) -> Option<OrderId> {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn totals(&self) -> OrderTotals {
        self.totals
    }

    /// Gross amount of all lines.
    pub fn subtotal(&self) -> Money {
        self.totals.subtotal
    }

    pub fn discount(&self) -> Money {
        self.totals.discount
    }

    pub fn delivery_fee(&self) -> Money {
        self.totals.delivery_fee
    }

    pub fn total(&self) -> Money {
        self.totals.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusChange<OrderStatus>] {
        &self.status_history
    }

    pub fn payment_method(&self) -> &PaymentMethod {
        &self.payment_method
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_status_history(&self) -> &[StatusChange<PaymentStatus>] {
        &self.payment_status_history
    }

    pub fn delivery_address(&self) -> &DeliveryAddress {
        &self.delivery_address
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// Quantity held per batch across all lines.
    pub fn batch_quantities(&self) -> BTreeMap<BatchId, u32> {
        batch_quantities(&self.items)
    }

    /// Pending, cash-on-delivery and not yet paid or refunded.
    pub fn ensure_modifiable(&self) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotPlaced);
        }
        if self.status != OrderStatus::Pending {
            return Err(OrderError::NotModifiable(format!(
                "status is {}, edits need pending",
                self.status
            )));
        }
        if !self.payment_method.is_cash_on_delivery() {
            return Err(OrderError::NotModifiable(
                "only cash-on-delivery orders can be modified".into(),
            ));
        }
        if self.payment_status.is_settled() {
            return Err(OrderError::NotModifiable(format!(
                "payment is already {}",
                self.payment_status
            )));
        }
        Ok(())
    }

    pub fn is_modifiable(&self) -> bool {
        self.ensure_modifiable().is_ok()
    }
}

/// Sums line quantities per batch.
pub(crate) fn batch_quantities(items: &[OrderItem]) -> BTreeMap<BatchId, u32> {
    let mut totals = BTreeMap::new();
    for item in items {
        *totals.entry(item.batch_id).or_insert(0) += item.quantity;
    }
    totals
}

fn validate_items(items: &[OrderItem], delivery_fee: Money) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }
    if let Some(item) = items.iter().find(|i| i.quantity == 0) {
        return Err(OrderError::InvalidQuantity {
            product_id: item.product_id.clone(),
            quantity: 0,
        });
    }

    // Totals are summed unchecked once applied.
    items
        .iter()
        .try_fold(delivery_fee, |acc, item| {
            item.unit_price
                .checked_times(item.quantity)
                .and_then(|gross| acc.checked_add(gross))
        })
        .map(|_| ())
        .ok_or(OrderError::AmountOutOfRange)
}

// Command methods (return events)
impl Order {
    pub fn place(&self, placed: OrderPlacedData) -> Result<Vec<OrderEvent>, OrderError> {
        if let Some(id) = self.id {
            return Err(OrderError::AlreadyPlaced(id));
        }
        if placed.delivery_fee.is_negative() {
            return Err(OrderError::NegativeDeliveryFee);
        }
        validate_items(&placed.items, placed.delivery_fee)?;
        if let Some(field) = placed.delivery_address.missing_field() {
            return Err(OrderError::IncompleteAddress(field));
        }

        Ok(vec![OrderEvent::OrderPlaced(placed)])
    }

    /// Replaces every line. An identical line list yields no events.
    pub fn revise_items(
        &self,
        items: Vec<OrderItem>,
        revised_at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_modifiable()?;
        validate_items(&items, self.totals.delivery_fee)?;
        if items == self.items {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::ItemsRevised(ItemsRevisedData {
            items,
            revised_at,
        })])
    }

    /// Under [`TransitionPolicy::Strict`] only table transitions are
    /// accepted; under `OperatorOverride` anything else is recorded with
    /// `overridden` set. Setting the current status again is rejected in
    /// strict mode and a no-op otherwise.
    pub fn change_status(
        &self,
        to: OrderStatus,
        policy: TransitionPolicy,
        note: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let overridden = check_transition(
            self.id.is_some(),
            "order",
            self.status,
            to,
            self.status.can_transition_to(to),
            policy,
        )?;
        let Some(overridden) = overridden else {
            return Ok(vec![]);
        };

        Ok(vec![OrderEvent::StatusChanged(StatusChangedData {
            from: self.status,
            to,
            changed_at,
            note,
            overridden,
        })])
    }

    /// Same rules as [`Order::change_status`], against the payment table.
    pub fn change_payment_status(
        &self,
        to: PaymentStatus,
        policy: TransitionPolicy,
        note: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let overridden = check_transition(
            self.id.is_some(),
            "payment",
            self.payment_status,
            to,
            self.payment_status.can_transition_to(to),
            policy,
        )?;
        let Some(overridden) = overridden else {
            return Ok(vec![]);
        };

        Ok(vec![OrderEvent::PaymentStatusChanged(StatusChangedData {
            from: self.payment_status,
            to,
            changed_at,
            note,
            overridden,
        })])
    }

    pub fn cancel(
        &self,
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_modifiable()?;

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            reason,
            cancelled_at,
        })])
    }
}

/// `Some(overridden)` when the change should be recorded, `None` for a no-op.
fn check_transition<S: PartialEq + std::fmt::Display>(
    placed: bool,
    kind: &'static str,
    from: S,
    to: S,
    allowed: bool,
    policy: TransitionPolicy,
) -> Result<Option<bool>, OrderError> {
    if !placed {
        return Err(OrderError::NotPlaced);
    }
    let invalid = || OrderError::InvalidTransition {
        kind,
        from: from.to_string(),
        to: to.to_string(),
    };
    match policy {
        TransitionPolicy::Strict if allowed => Ok(Some(false)),
        TransitionPolicy::Strict => Err(invalid()),
        TransitionPolicy::OperatorOverride if from == to => Ok(None),
        TransitionPolicy::OperatorOverride => Ok(Some(!allowed)),
    }
}

// Event application
impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.customer_id = data.customer_id;
        self.totals = OrderTotals::from_items(&data.items, data.delivery_fee);
        self.items = data.items;
        self.payment_method = data.payment_method;
        self.delivery_address = data.delivery_address;
        self.status = OrderStatus::Pending;
        self.status_history = vec![StatusChange::new(OrderStatus::Pending, data.placed_at)];
        self.payment_status = PaymentStatus::Pending;
        self.payment_status_history =
            vec![StatusChange::new(PaymentStatus::Pending, data.placed_at)];
        self.created_at = Some(data.placed_at);
    }

    fn apply_revised(&mut self, data: ItemsRevisedData) {
        self.totals = OrderTotals::from_items(&data.items, self.totals.delivery_fee);
        self.items = data.items;
    }

    fn apply_status_changed(&mut self, data: StatusChangedData<OrderStatus>) {
        self.status = data.to;
        if data.to == OrderStatus::Delivered {
            self.delivered_at = Some(data.changed_at);
        }
        self.status_history.push(StatusChange {
            status: data.to,
            at: data.changed_at,
            note: data.note,
            overridden: data.overridden,
        });
    }

    fn apply_cancelled(&mut self, data: OrderCancelledData) {
        self.status = OrderStatus::Cancelled;
        self.status_history.push(StatusChange {
            status: OrderStatus::Cancelled,
            at: data.cancelled_at,
            note: data.reason,
            overridden: false,
        });
    }
}
