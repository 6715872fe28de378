//! The single posting interface for customer totals.

use std::sync::Arc;

use common::Clock;
use domain::{
    CommandHandler, CustomerId, DomainError, RetryPolicy, Staged, UnitOfWork, retry_on_conflict,
};
use event_store::EventStore;

use super::{Customer, CustomerDelta, CustomerError};

/// Owns customer streams. Every change to a customer's totals goes
/// through [`CustomerLedger::post_customer_delta`] or is staged with
/// [`CustomerLedger::stage_posting`] into a larger commit.
pub struct CustomerLedger<S> {
    handler: CommandHandler<S, Customer>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S: Clone> Clone for CustomerLedger<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            clock: Arc::clone(&self.clock),
            retry: self.retry,
        }
    }
}

impl<S: EventStore> CustomerLedger<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            handler: CommandHandler::new(store),
            clock,
            retry,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn register(&self, name: &str, email: &str) -> Result<Customer, DomainError> {
        let customer_id = CustomerId::new();
        let result = self
            .handler
            .execute(customer_id.stream(), self.clock.now(), |customer| {
                customer.register(customer_id, name, email, self.clock.now())
            })
            .await?;

        tracing::info!(%customer_id, "customer registered");
        Ok(result.aggregate)
    }

    pub async fn get_by_id(&self, customer_id: CustomerId) -> Result<Option<Customer>, DomainError> {
        self.handler.load_existing(customer_id.stream()).await
    }

    pub async fn require(&self, customer_id: CustomerId) -> Result<Customer, DomainError> {
        self.handler.require(customer_id.stream(), "customer").await
    }

    /// Posts `delta` on its own, retrying conflicts against fresh totals.
    #[tracing::instrument(skip(self))]
    pub async fn post_customer_delta(
        &self,
        customer_id: CustomerId,
        delta: CustomerDelta,
    ) -> Result<Customer, DomainError> {
        retry_on_conflict(self.retry, "post_customer_delta", || {
            let delta = delta.clone();
            async move {
                let customer = self.require(customer_id).await?;
                let Some(staged) = self.stage_posting(&customer, delta)? else {
                    return Ok(customer);
                };

                let mut uow = UnitOfWork::new();
                let customer = uow.push(staged);
                uow.commit(self.handler.store()).await?;
                Ok::<_, DomainError>(customer)
            }
        })
        .await
    }

    /// Stages `delta` against an already-loaded customer. `None` for a
    /// zero delta.
    pub fn stage_posting(
        &self,
        customer: &Customer,
        delta: CustomerDelta,
    ) -> Result<Option<Staged<Customer>>, DomainError> {
        let Some(customer_id) = customer.customer_id() else {
            return Err(CustomerError::NotRegistered.into());
        };
        let events = customer.post(delta, self.clock.now())?;
        self.handler
            .stage(customer_id.stream(), customer, events, self.clock.now())
    }
}
