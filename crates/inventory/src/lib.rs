//! Inventory side of the reconciliation engine.
//!
//! - [`BatchLedger`]: per-batch quantity postings with optimistic concurrency
//! - [`StockAggregator`]: usable/expired stock and FEFO batch selection
//! - [`discount`]: in-effect discount matching and the best applicable discount
//! - [`Catalog`]: the product/discount collaborator

pub mod batch;
pub mod catalog;
pub mod discount;
pub mod stock;

pub use batch::{
    Batch, BatchError, BatchEvent, BatchLedger, BatchStatus, ReceiveBatch,
};
pub use catalog::{Catalog, InMemoryCatalog, Product};
pub use discount::{
    Discount, DiscountScope, DiscountValue, best_applicable_discount, highest_applicable_percentage,
};
pub use stock::{ProductStock, StockAggregator, fefo_order, fefo_order_by};
