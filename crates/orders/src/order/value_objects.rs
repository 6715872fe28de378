//! Value objects carried by orders.

use domain::{BatchId, Money, Percentage, ProductId};
use inventory::DiscountValue;
use serde::{Deserialize, Serialize};

/// How the customer pays. Only cash-on-delivery orders can be edited or
/// cancelled through the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
    Online { provider: String },
}

impl PaymentMethod {
    pub fn is_cash_on_delivery(&self) -> bool {
        matches!(self, PaymentMethod::CashOnDelivery)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub recipient: String,
    pub phone: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl DeliveryAddress {
    pub fn new(
        recipient: impl Into<String>,
        phone: impl Into<String>,
        line1: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            phone: phone.into(),
            line1: line1.into(),
            line2: None,
            city: city.into(),
            postal_code: None,
        }
    }

    /// Name of the first required field that is blank.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("recipient", &self.recipient),
            ("phone", &self.phone),
            ("line1", &self.line1),
            ("city", &self.city),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// A priced order line bound to the batch it consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub batch_id: BatchId,
    pub quantity: u32,
    pub unit_price: Money,
    /// The discount charged on this line.
    pub applied_discount: DiscountValue,
    /// `applied_discount` as a rate of `unit_price`, for comparison and display.
    pub discount_rate: Percentage,
    pub discount: Money,
    /// `unit_price * quantity - discount`.
    pub subtotal: Money,
}

impl OrderItem {
    /// Prices a line. A percentage is taken of the line's gross amount and
    /// rounded to the cent; a fixed amount comes off every unit. The
    /// discount never exceeds the gross amount.
    pub fn priced(
        product_id: ProductId,
        product_name: impl Into<String>,
        batch_id: BatchId,
        quantity: u32,
        unit_price: Money,
        applied_discount: DiscountValue,
    ) -> Self {
        let gross = unit_price.times(quantity);
        let discount = applied_discount.amount_off(unit_price, quantity);
        Self {
            product_id,
            product_name: product_name.into(),
            batch_id,
            quantity,
            unit_price,
            applied_discount,
            discount_rate: applied_discount.rate_for(unit_price),
            discount,
            subtotal: gross - discount,
        }
    }

    /// Same price and discount, different quantity.
    pub fn with_quantity(&self, quantity: u32) -> Self {
        Self::priced(
            self.product_id.clone(),
            self.product_name.clone(),
            self.batch_id,
            quantity,
            self.unit_price,
            self.applied_discount,
        )
    }

    pub fn gross(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Order-level amounts.
///
/// `subtotal` is the gross sum of all lines; `total = subtotal - discount + delivery_fee`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub delivery_fee: Money,
    pub total: Money,
}

impl OrderTotals {
    pub fn from_items(items: &[OrderItem], delivery_fee: Money) -> Self {
        let subtotal: Money = items.iter().map(OrderItem::gross).sum();
        let discount: Money = items.iter().map(|i| i.discount).sum();
        Self {
            subtotal,
            discount,
            delivery_fee,
            total: subtotal - discount + delivery_fee,
        }
    }
}
