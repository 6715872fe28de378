//! Product and discount lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CategoryId, DiscountId, DomainError, ProductId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::discount::{Discount, DiscountScope};

/// The catalog fields the engine reads. Prices come from batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    #[serde(default)]
    pub discount_ids: Vec<DiscountId>,
    #[serde(default)]
    pub minimum_stock_quantity: u32,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category_ids: Vec::new(),
            discount_ids: Vec::new(),
            minimum_stock_quantity: 0,
        }
    }

    pub fn with_category(mut self, category_id: impl Into<CategoryId>) -> Self {
        self.category_ids.push(category_id.into());
        self
    }

    pub fn with_discount(mut self, discount_id: impl Into<DiscountId>) -> Self {
        self.discount_ids.push(discount_id.into());
        self
    }

    pub fn with_minimum_stock(mut self, quantity: u32) -> Self {
        self.minimum_stock_quantity = quantity;
        self
    }
}

/// Read-only access to products and their candidate discounts.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>, DomainError>;

    /// Discounts that might apply to `product`, in effect or not.
    /// Filtering by window and scope is left to the resolver.
    async fn discounts_for(&self, product: &Product) -> Result<Vec<Discount>, DomainError>;

    async fn require_product(&self, product_id: &ProductId) -> Result<Product, DomainError> {
        self.product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product", product_id))
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, Product>,
    discounts: HashMap<DiscountId, Discount>,
}

/// Catalog held in memory; used by tests and the benchmarks.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_product(&self, product: Product) {
        let mut state = self.state.write().await;
        state.products.insert(product.id.clone(), product);
    }

    pub async fn upsert_discount(&self, discount: Discount) {
        let mut state = self.state.write().await;
        state.discounts.insert(discount.id.clone(), discount);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, product_id: &ProductId) -> Result<Option<Product>, DomainError> {
        Ok(self.state.read().await.products.get(product_id).cloned())
    }

    async fn discounts_for(&self, product: &Product) -> Result<Vec<Discount>, DomainError> {
        let state = self.state.read().await;
        let mut found: Vec<Discount> = state
            .discounts
            .values()
            .filter(|d| {
                product.discount_ids.contains(&d.id)
                    || match d.applicable_to {
                        DiscountScope::Products => d.applicable_product_ids.contains(&product.id),
                        DiscountScope::Categories => product
                            .category_ids
                            .iter()
                            .any(|c| d.applicable_category_ids.contains(c)),
                        DiscountScope::Order => false,
                    }
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}
