//! Batch commands.

use chrono::NaiveDate;
use domain::{Money, ProductId};

/// Stock intake for one product lot.
#[derive(Debug, Clone)]
pub struct ReceiveBatch {
    pub batch_code: String,
    pub product_id: ProductId,
    pub manufacturing_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
    pub price: Money,
    pub supplier: Option<String>,
    pub location: Option<String>,
}

impl ReceiveBatch {
    pub fn new(
        batch_code: impl Into<String>,
        product_id: impl Into<ProductId>,
        manufacturing_date: NaiveDate,
        expiry_date: NaiveDate,
        quantity: u32,
        price: Money,
    ) -> Self {
        Self {
            batch_code: batch_code.into(),
            product_id: product_id.into(),
            manufacturing_date,
            expiry_date,
            quantity,
            price,
            supplier: None,
            location: None,
        }
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
