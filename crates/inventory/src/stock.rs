//! Per-product stock figures and FEFO batch selection.

use std::sync::Arc;

use chrono::NaiveDate;
use common::Clock;
use domain::{DomainError, Money, ProductId};
use event_store::EventStore;
use serde::Serialize;

use crate::batch::{Batch, BatchLedger};

/// Stock of one product, recomputed from its batches on every read.
///
/// A read model only: quantities are never decremented through it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProductStock {
    /// Remaining quantity in batches that have not expired.
    pub usable_stock: u64,
    /// Remaining quantity in expired batches.
    pub expired_stock: u64,
    pub total_stock: u64,
    /// Unexpired batches with stock left.
    pub active_batch_count: usize,
    /// Highest price among active batches; the product's listed price.
    pub synced_price: Option<Money>,
}

impl ProductStock {
    pub fn from_batches(batches: &[Batch], today: NaiveDate) -> Self {
        let mut stock = Self::default();

        for batch in batches {
            let remaining = u64::from(batch.remaining());
            if batch.is_expired(today) {
                stock.expired_stock += remaining;
                continue;
            }
            stock.usable_stock += remaining;
            if remaining > 0 {
                stock.active_batch_count += 1;
                stock.synced_price = stock.synced_price.max(Some(batch.price()));
            }
        }

        stock.total_stock = stock.usable_stock + stock.expired_stock;
        stock
    }

    /// True when usable stock has fallen below the product's minimum.
    pub fn is_below_minimum(&self, minimum_stock_quantity: u32) -> bool {
        self.usable_stock < u64::from(minimum_stock_quantity)
    }
}

/// Batches that can serve an order, first-expiring first.
///
/// Candidates have stock left and are not expired. Ties on expiry go to
/// the earlier manufacturing date, then to the lower batch code and id.
pub fn fefo_order(batches: impl IntoIterator<Item = Batch>, today: NaiveDate) -> Vec<Batch> {
    fefo_order_by(batches, today, Batch::remaining)
}

/// [`fefo_order`] with availability measured by `available` instead of
/// the batch's remaining quantity, e.g. to count stock a caller already
/// holds in a batch.
pub fn fefo_order_by(
    batches: impl IntoIterator<Item = Batch>,
    today: NaiveDate,
    available: impl Fn(&Batch) -> u32,
) -> Vec<Batch> {
    let mut candidates: Vec<Batch> = batches
        .into_iter()
        .filter(|b| available(b) > 0 && !b.is_expired(today))
        .collect();

    candidates.sort_by(|a, b| {
        a.expiry_date()
            .cmp(&b.expiry_date())
            .then(a.manufacturing_date().cmp(&b.manufacturing_date()))
            .then_with(|| a.batch_code().cmp(b.batch_code()))
            .then_with(|| a.batch_id().cmp(&b.batch_id()))
    });
    candidates
}

/// Reads batches through the ledger and derives stock views from them.
pub struct StockAggregator<S> {
    ledger: BatchLedger<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Clone> Clone for StockAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: EventStore> StockAggregator<S> {
    pub fn new(ledger: BatchLedger<S>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    pub fn ledger(&self) -> &BatchLedger<S> {
        &self.ledger
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    #[tracing::instrument(skip(self))]
    pub async fn usable_stock(&self, product_id: &ProductId) -> Result<ProductStock, DomainError> {
        let batches = self.ledger.batches_for_product(product_id).await?;
        Ok(ProductStock::from_batches(&batches, self.clock.today()))
    }

    /// All batches able to serve `product_id`, in FEFO order.
    pub async fn fefo_batches(&self, product_id: &ProductId) -> Result<Vec<Batch>, DomainError> {
        let batches = self.ledger.batches_for_product(product_id).await?;
        Ok(fefo_order(batches, self.clock.today()))
    }

    /// The batch an order for `product_id` should draw from, or `None` when
    /// nothing is available.
    pub async fn select_fefo_batch(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<Batch>, DomainError> {
        Ok(self.fefo_batches(product_id).await?.into_iter().next())
    }
}
