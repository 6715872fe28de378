//! Order commands.

use domain::{BatchId, CustomerId, Money, OrderId, ProductId};

use super::{DeliveryAddress, PaymentMethod};

/// A requested product and quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    pub delivery_address: DeliveryAddress,
    /// Falls back to the configured default when `None`.
    pub delivery_fee: Option<Money>,
}

impl CreateOrder {
    /// A cash-on-delivery order with a fresh id and no lines yet.
    pub fn new(customer_id: CustomerId, delivery_address: DeliveryAddress) -> Self {
        Self {
            order_id: OrderId::new(),
            customer_id,
            lines: Vec::new(),
            payment_method: PaymentMethod::CashOnDelivery,
            delivery_address,
            delivery_fee: None,
        }
    }

    pub fn with_line(mut self, product_id: impl Into<ProductId>, quantity: u32) -> Self {
        self.lines.push(OrderLine::new(product_id, quantity));
        self
    }

    pub fn with_payment_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = payment_method;
        self
    }

    pub fn with_delivery_fee(mut self, fee: Money) -> Self {
        self.delivery_fee = Some(fee);
        self
    }
}

/// A line of an edited order. Without a batch the engine picks one FEFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub batch_id: Option<BatchId>,
}

impl EditLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            batch_id: None,
        }
    }

    pub fn from_batch(product_id: impl Into<ProductId>, batch_id: BatchId, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            batch_id: Some(batch_id),
        }
    }
}

/// Command to replace the lines of a pending order.
#[derive(Debug, Clone)]
pub struct UpdateOrder {
    pub order_id: OrderId,
    pub lines: Vec<EditLine>,
}

impl UpdateOrder {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            lines: Vec::new(),
        }
    }

    pub fn with_line(mut self, line: EditLine) -> Self {
        self.lines.push(line);
        self
    }
}
