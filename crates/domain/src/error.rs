//! Domain error taxonomy.

use event_store::EventStoreError;
use thiserror::Error;

use crate::ids::{BatchId, ProductId};

/// Errors surfaced by every engine operation.
///
/// Only [`DomainError::ConcurrencyConflict`] is the result of internal
/// retries; everything else aborts the operation on first occurrence and
/// leaves no partial writes behind.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced batch, order, customer or product does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// No usable batch, or the FEFO batch cannot cover the requested quantity.
    #[error("Out of stock for product {product_id}: requested {requested}, available {available}")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A ledger posting would drive a batch below zero.
    #[error("Insufficient stock in batch {batch_id}: remaining {remaining}, requested {requested}")]
    InsufficientStock {
        batch_id: BatchId,
        remaining: u32,
        requested: u32,
    },

    /// The operation is not permitted in the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Optimistic concurrency kept failing after every allowed attempt.
    #[error("Concurrency conflict in {operation}: gave up after {attempts} attempts")]
    ConcurrencyConflict {
        operation: &'static str,
        attempts: u32,
    },

    /// Malformed input, rejected before anything is persisted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A ledger was asked to record an impossible state.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for store-level version conflicts, the only retryable failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::EventStore(e) if e.is_conflict())
    }
}
