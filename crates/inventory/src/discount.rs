//! Discount matching and the best applicable discount.

use chrono::{DateTime, Utc};
use domain::{CategoryId, DiscountId, Money, Percentage, ProductId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountValue {
    Percentage { rate: Percentage },
    /// A fixed amount off each unit.
    Fixed { amount: Money },
}

impl DiscountValue {
    pub const NONE: DiscountValue = DiscountValue::Percentage {
        rate: Percentage::ZERO,
    };

    /// The rate this value represents for a unit priced at `price`.
    ///
    /// Fixed amounts become `amount / price`, capped at 100%. The rate is
    /// only used to compare discounts; [`DiscountValue::amount_off`] charges.
    pub fn rate_for(&self, price: Money) -> Percentage {
        match *self {
            DiscountValue::Percentage { rate } => rate,
            DiscountValue::Fixed { amount } => Percentage::of(amount, price),
        }
    }

    /// Amount taken off `quantity` units at `unit_price`, never more than
    /// the line's gross amount.
    pub fn amount_off(&self, unit_price: Money, quantity: u32) -> Money {
        let gross = unit_price.times(quantity);
        let off = match *self {
            DiscountValue::Percentage { rate } => rate.apply_to(gross),
            DiscountValue::Fixed { amount } => amount
                .max(Money::zero())
                .checked_times(quantity)
                .unwrap_or(gross),
        };
        off.min(gross)
    }
}

impl Default for DiscountValue {
    fn default() -> Self {
        Self::NONE
    }
}

/// What a discount is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountScope {
    Products,
    Categories,
    /// Whole-order discounts; never matched against a single line.
    Order,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    pub name: String,
    pub value: DiscountValue,
    pub applicable_to: DiscountScope,
    #[serde(default)]
    pub applicable_product_ids: Vec<ProductId>,
    #[serde(default)]
    pub applicable_category_ids: Vec<CategoryId>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    /// Stored for reporting; order flows do not increment it.
    #[serde(default)]
    pub current_usage_count: u32,
}

impl Discount {
    /// Active with `at` inside the inclusive window.
    pub fn is_in_effect(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= at && at <= self.end_date
    }

    pub fn applies_to(&self, product_id: &ProductId, category_ids: &[CategoryId]) -> bool {
        match self.applicable_to {
            DiscountScope::Products => self.applicable_product_ids.contains(product_id),
            DiscountScope::Categories => category_ids
                .iter()
                .any(|c| self.applicable_category_ids.contains(c)),
            DiscountScope::Order => false,
        }
    }

    /// See [`DiscountValue::rate_for`].
    pub fn effective_rate(&self, price: Money) -> Percentage {
        self.value.rate_for(price)
    }
}

/// The discount in effect at `at` with the highest rate for a unit priced
/// at `price`, matching the product directly or through one of its
/// categories.
///
/// Order-independent: equal rates fall back to the larger amount off one
/// unit, then to the smallest discount id.
pub fn best_applicable_discount<'a>(
    discounts: impl IntoIterator<Item = &'a Discount>,
    product_id: &ProductId,
    category_ids: &[CategoryId],
    price: Money,
    at: DateTime<Utc>,
) -> Option<&'a Discount> {
    discounts
        .into_iter()
        .filter(|d| d.is_in_effect(at) && d.applies_to(product_id, category_ids))
        .max_by(|a, b| {
            a.effective_rate(price)
                .cmp(&b.effective_rate(price))
                .then_with(|| a.value.amount_off(price, 1).cmp(&b.value.amount_off(price, 1)))
                .then_with(|| b.id.cmp(&a.id))
        })
}

/// The rate of [`best_applicable_discount`]; zero when nothing matches.
pub fn highest_applicable_percentage<'a>(
    discounts: impl IntoIterator<Item = &'a Discount>,
    product_id: &ProductId,
    category_ids: &[CategoryId],
    price: Money,
    at: DateTime<Utc>,
) -> Percentage {
    best_applicable_discount(discounts, product_id, category_ids, price, at)
        .map(|d| d.effective_rate(price))
        .unwrap_or(Percentage::ZERO)
}
