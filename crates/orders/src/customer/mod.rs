//! Customers and their running order totals.

mod aggregate;
mod events;
mod ledger;

pub use aggregate::{Customer, CustomerDelta};
pub use events::{CustomerEvent, CustomerRegisteredData, TotalsPostedData};
pub use ledger::CustomerLedger;

use domain::{CustomerId, DomainError, Money};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("Customer {0} is already registered")]
    AlreadyRegistered(CustomerId),

    #[error("Customer has not been registered")]
    NotRegistered,

    #[error("Invalid customer: {0}")]
    Invalid(String),

    /// Posting would leave a running total below zero.
    #[error("Customer totals would go negative: {total_orders} orders, {total_spent} spent")]
    NegativeTotals { total_orders: i64, total_spent: Money },
}

impl From<CustomerError> for DomainError {
    fn from(e: CustomerError) -> Self {
        match e {
            CustomerError::AlreadyRegistered(_) | CustomerError::NotRegistered => {
                DomainError::InvalidState(e.to_string())
            }
            CustomerError::Invalid(_) => DomainError::Validation(e.to_string()),
            CustomerError::NegativeTotals { .. } => DomainError::Invariant(e.to_string()),
        }
    }
}
