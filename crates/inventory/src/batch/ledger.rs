//! The batch ledger: the only writer of batch quantities.

use std::sync::Arc;

use common::Clock;
use domain::{
    BatchId, CommandHandler, DomainError, ProductId, RetryPolicy, Staged, retry_on_conflict,
};
use event_store::{EventQuery, EventStore};

use super::{Batch, ReceiveBatch};

/// Owns batch streams and posts signed quantity deltas to them.
///
/// Every write is conditioned on the batch version it was computed from,
/// so two postings racing on one batch serialize: the loser re-reads and
/// is re-validated against the winner's result.
pub struct BatchLedger<S> {
    handler: CommandHandler<S, Batch>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S: Clone> Clone for BatchLedger<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            clock: Arc::clone(&self.clock),
            retry: self.retry,
        }
    }
}

impl<S: EventStore> BatchLedger<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            handler: CommandHandler::new(store),
            clock,
            retry,
        }
    }

    /// Creates a batch stream for new stock.
    #[tracing::instrument(skip(self))]
    pub async fn receive_batch(&self, cmd: ReceiveBatch) -> Result<Batch, DomainError> {
        let batch_id = BatchId::new();
        let result = self
            .handler
            .execute(batch_id.stream(), self.clock.now(), |batch| {
                batch.receive(batch_id, cmd, self.clock.now())
            })
            .await?;

        tracing::info!(
            %batch_id,
            code = result.aggregate.batch_code(),
            quantity = result.aggregate.quantity(),
            "batch received"
        );
        Ok(result.aggregate)
    }

    pub async fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>, DomainError> {
        self.handler.load_existing(batch_id.stream()).await
    }

    /// Fails with `NotFound` for unknown batches.
    pub async fn require_batch(&self, batch_id: BatchId) -> Result<Batch, DomainError> {
        self.handler.require(batch_id.stream(), "batch").await
    }

    /// Applies `remaining += delta` to one batch.
    ///
    /// Conflicts are retried against fresh state; a posting whose key was
    /// already applied returns the batch unchanged. Fails with
    /// `InsufficientStock` if the batch would go negative.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_quantity(
        &self,
        batch_id: BatchId,
        delta: i64,
        idempotency_key: &str,
    ) -> Result<Batch, DomainError> {
        retry_on_conflict(self.retry, "adjust_quantity", move || async move {
            let batch = self.require_batch(batch_id).await?;
            let events = batch.adjust(delta, idempotency_key, self.clock.now())?;
            let Some(staged) =
                self.handler
                    .stage(batch_id.stream(), &batch, events, self.clock.now())?
            else {
                tracing::debug!(%batch_id, idempotency_key, "posting already applied");
                return Ok(batch);
            };

            let mut uow = domain::UnitOfWork::new();
            let batch = uow.push(staged);
            uow.commit(self.handler.store()).await?;

            metrics::counter!("stock_adjustments_total").increment(1);
            tracing::debug!(%batch_id, delta, remaining = batch.remaining(), "quantity adjusted");
            Ok::<_, DomainError>(batch)
        })
        .await
    }

    /// Stages a posting against an already-loaded batch for inclusion in a
    /// larger commit. `None` when the key was already applied.
    pub fn stage_adjustment(
        &self,
        batch: &Batch,
        delta: i64,
        idempotency_key: &str,
    ) -> Result<Option<Staged<Batch>>, DomainError> {
        let Some(batch_id) = batch.batch_id() else {
            return Err(DomainError::InvalidState(
                "cannot post to a batch that was never received".into(),
            ));
        };
        let events = batch.adjust(delta, idempotency_key, self.clock.now())?;
        self.handler
            .stage(batch_id.stream(), batch, events, self.clock.now())
    }

    /// Every batch ever received for `product_id`, in intake order.
    pub async fn batches_for_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<Batch>, DomainError> {
        let received = self
            .handler
            .store()
            .query(
                EventQuery::new()
                    .aggregate_type("Batch")
                    .event_type("BatchReceived")
                    .tag("product_id", product_id.as_str()),
            )
            .await?;

        let mut batches = Vec::with_capacity(received.len());
        for envelope in received {
            if let Some(batch) = self.handler.load_existing(envelope.aggregate_id).await? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }
}
