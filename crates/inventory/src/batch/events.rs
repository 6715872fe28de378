//! Batch domain events.

use chrono::{DateTime, NaiveDate, Utc};
use domain::{BatchId, DomainEvent, Money, ProductId};
use serde::{Deserialize, Serialize};

/// Events recorded on a batch stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BatchEvent {
    /// Stock arrived; the batch starts full.
    BatchReceived(BatchReceivedData),

    /// A signed posting against the remaining quantity.
    QuantityAdjusted(QuantityAdjustedData),
}

impl DomainEvent for BatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BatchEvent::BatchReceived(_) => "BatchReceived",
            BatchEvent::QuantityAdjusted(_) => "QuantityAdjusted",
        }
    }

    fn tags(&self) -> Vec<(&'static str, String)> {
        match self {
            BatchEvent::BatchReceived(data) => {
                vec![("product_id", data.product_id.to_string())]
            }
            BatchEvent::QuantityAdjusted(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReceivedData {
    pub batch_id: BatchId,

    /// External lot code printed on the stock.
    pub batch_code: String,

    pub product_id: ProductId,
    pub manufacturing_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub quantity: u32,

    /// Unit price of stock drawn from this batch.
    pub price: Money,

    pub supplier: Option<String>,
    pub location: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityAdjustedData {
    /// Negative consumes stock, positive returns it.
    pub delta: i64,

    pub remaining_after: u32,

    /// Replaying a posting with the same key has no effect.
    pub idempotency_key: String,

    pub adjusted_at: DateTime<Utc>,
}

impl BatchEvent {
    pub fn quantity_adjusted(
        delta: i64,
        remaining_after: u32,
        idempotency_key: impl Into<String>,
        adjusted_at: DateTime<Utc>,
    ) -> Self {
        BatchEvent::QuantityAdjusted(QuantityAdjustedData {
            delta,
            remaining_after,
            idempotency_key: idempotency_key.into(),
            adjusted_at,
        })
    }
}
