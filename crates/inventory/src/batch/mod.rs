//! Stock batches and the ledger that owns their quantities.

mod aggregate;
mod commands;
mod events;
mod ledger;

pub use aggregate::{Batch, BatchStatus, KEY_WINDOW};
pub use commands::ReceiveBatch;
pub use events::{BatchEvent, BatchReceivedData, QuantityAdjustedData};
pub use ledger::BatchLedger;

use domain::{BatchId, DomainError};
use thiserror::Error;

/// Rejections produced by [`Batch`] command methods.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch {0} has already been received")]
    AlreadyReceived(BatchId),

    #[error("Batch has not been received")]
    NotReceived,

    #[error("Invalid batch: {0}")]
    Invalid(String),

    #[error("Quantity delta must be non-zero")]
    ZeroDelta,

    #[error("Batch {batch_id} has {remaining} remaining, cannot take {requested}")]
    Insufficient {
        batch_id: BatchId,
        remaining: u32,
        requested: u32,
    },

    #[error("Batch {batch_id} would exceed its received quantity {quantity} (remaining {remaining}, delta {delta})")]
    OverCapacity {
        batch_id: BatchId,
        quantity: u32,
        remaining: u32,
        delta: i64,
    },
}

impl From<BatchError> for DomainError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::Insufficient {
                batch_id,
                remaining,
                requested,
            } => DomainError::InsufficientStock {
                batch_id,
                remaining,
                requested,
            },
            BatchError::OverCapacity { .. } => DomainError::Invariant(e.to_string()),
            BatchError::AlreadyReceived(_) | BatchError::NotReceived => {
                DomainError::InvalidState(e.to_string())
            }
            BatchError::Invalid(_) | BatchError::ZeroDelta => DomainError::Validation(e.to_string()),
        }
    }
}
