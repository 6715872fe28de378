//! Batch aggregate.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use domain::{Aggregate, BatchId, Money, ProductId, SnapshotCapable};
use event_store::Version;
use serde::{Deserialize, Serialize};

use super::{
    BatchError, BatchEvent, ReceiveBatch,
    events::{BatchReceivedData, QuantityAdjustedData},
};

/// Derived from the expiry date at read time; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Expired,
}

/// How many of its most recent idempotency keys a batch remembers.
pub const KEY_WINDOW: usize = 256;

/// A dated lot of stock for one product.
///
/// `remaining` only changes through [`Batch::adjust`], which keeps
/// `0 <= remaining <= quantity` and ignores postings whose idempotency key
/// is among the last [`KEY_WINDOW`] applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    id: Option<BatchId>,

    #[serde(default)]
    version: Version,

    batch_code: String,
    product_id: ProductId,
    manufacturing_date: NaiveDate,
    expiry_date: NaiveDate,
    quantity: u32,
    remaining: u32,
    price: Money,
    supplier: Option<String>,
    location: Option<String>,
    applied_keys: VecDeque<String>,
}

impl Aggregate for Batch {
    type Event = BatchEvent;
    type Error = BatchError;

    fn aggregate_type() -> &'static str {
        "Batch"
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
            BatchEvent::BatchReceived(data) => self.apply_received(data),
            BatchEvent::QuantityAdjusted(data) => self.apply_adjusted(data),
        }
    }
}

impl SnapshotCapable for Batch {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Batch {
    pub fn batch_id(&self) -> Option<BatchId> {
        self.id
    }

    pub fn batch_code(&self) -> &str {
        &self.batch_code
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn manufacturing_date(&self) -> NaiveDate {
        self.manufacturing_date
    }

    pub fn expiry_date(&self) -> NaiveDate {
        self.expiry_date
    }

    /// Quantity received at intake.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn supplier(&self) -> Option<&str> {
        self.supplier.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Expired once `today` is past the expiry date.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    pub fn status(&self, today: NaiveDate) -> BatchStatus {
        if self.is_expired(today) {
            BatchStatus::Expired
        } else {
            BatchStatus::Active
        }
    }

    pub fn has_applied(&self, idempotency_key: &str) -> bool {
        self.applied_keys.iter().any(|k| k == idempotency_key)
    }
}

// Command methods (return events)
impl Batch {
    /// Records stock intake.
    pub fn receive(
        &self,
        batch_id: BatchId,
        cmd: ReceiveBatch,
        received_at: DateTime<Utc>,
    ) -> Result<Vec<BatchEvent>, BatchError> {
        if let Some(id) = self.id {
            return Err(BatchError::AlreadyReceived(id));
        }
        if cmd.batch_code.trim().is_empty() {
            return Err(BatchError::Invalid("batch code is required".into()));
        }
        if cmd.quantity == 0 {
            return Err(BatchError::Invalid("quantity must be positive".into()));
        }
        if cmd.price.is_negative() {
            return Err(BatchError::Invalid(format!(
                "price must not be negative, got {}",
                cmd.price
            )));
        }
        if cmd.price > Money::MAX_UNIT_PRICE {
            return Err(BatchError::Invalid(format!(
                "price {} exceeds the maximum of {}",
                cmd.price,
                Money::MAX_UNIT_PRICE
            )));
        }
        if cmd.manufacturing_date > cmd.expiry_date {
            return Err(BatchError::Invalid(format!(
                "manufactured {} after expiry {}",
                cmd.manufacturing_date, cmd.expiry_date
            )));
        }

        Ok(vec![BatchEvent::BatchReceived(BatchReceivedData {
            batch_id,
            batch_code: cmd.batch_code,
            product_id: cmd.product_id,
            manufacturing_date: cmd.manufacturing_date,
            expiry_date: cmd.expiry_date,
            quantity: cmd.quantity,
            price: cmd.price,
            supplier: cmd.supplier,
            location: cmd.location,
            received_at,
        })])
    }

    /// Posts a signed quantity delta.
    ///
    /// A key that was already applied yields no events.
    pub fn adjust(
        &self,
        delta: i64,
        idempotency_key: &str,
        adjusted_at: DateTime<Utc>,
    ) -> Result<Vec<BatchEvent>, BatchError> {
        let Some(batch_id) = self.id else {
            return Err(BatchError::NotReceived);
        };
        if self.has_applied(idempotency_key) {
            return Ok(vec![]);
        }
        if delta == 0 {
            return Err(BatchError::ZeroDelta);
        }

        let after = i64::from(self.remaining) + delta;
        if after < 0 {
            return Err(BatchError::Insufficient {
                batch_id,
                remaining: self.remaining,
                requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
            });
        }
        if after > i64::from(self.quantity) {
            return Err(BatchError::OverCapacity {
                batch_id,
                quantity: self.quantity,
                remaining: self.remaining,
                delta,
            });
        }

        Ok(vec![BatchEvent::quantity_adjusted(
            delta,
            after as u32,
            idempotency_key,
            adjusted_at,
        )])
    }
}

// Event application
impl Batch {
    fn apply_received(&mut self, data: BatchReceivedData) {
        self.id = Some(data.batch_id);
        self.batch_code = data.batch_code;
        self.product_id = data.product_id;
        self.manufacturing_date = data.manufacturing_date;
        self.expiry_date = data.expiry_date;
        self.quantity = data.quantity;
        self.remaining = data.quantity;
        self.price = data.price;
        self.supplier = data.supplier;
        self.location = data.location;
    }

    fn apply_adjusted(&mut self, data: QuantityAdjustedData) {
        self.remaining = data.remaining_after;
        if self.applied_keys.len() == KEY_WINDOW {
            self.applied_keys.pop_front();
        }
        self.applied_keys.push_back(data.idempotency_key);
    }
}
