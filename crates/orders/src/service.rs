//! The order reconciliation engine.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::Clock;
use domain::{
    Aggregate, BatchId, CommandHandler, DomainError, EngineConfig, OrderId, ProductId, UnitOfWork,
    retry_on_conflict,
};
use event_store::{EventStore, Version};
use inventory::{
    Batch, BatchLedger, Catalog, DiscountValue, Product, StockAggregator, best_applicable_discount,
    fefo_order_by,
};

use crate::customer::{CustomerDelta, CustomerLedger};
use crate::order::{
    CreateOrder, EditLine, Order, OrderError, OrderEvent, OrderItem, OrderLine, OrderPlacedData,
    OrderStatus, PaymentStatus, UpdateOrder,
};

/// Places, edits, cancels and advances orders.
///
/// Each operation reads the order, the batches it touches and the
/// customer, decides every event up front and writes them in one
/// multi-stream commit conditioned on the versions it read. A conflict
/// re-runs the whole decision against fresh state, so a stale stock read
/// can never be committed and nothing is ever half-applied.
pub struct OrderService<S, C> {
    orders: CommandHandler<S, Order>,
    stock: StockAggregator<S>,
    customers: CustomerLedger<S>,
    catalog: C,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S, C> OrderService<S, C>
where
    S: EventStore + Clone,
    C: Catalog,
{
    pub fn new(store: S, catalog: C, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let ledger = BatchLedger::new(store.clone(), Arc::clone(&clock), config.retry);
        Self {
            orders: CommandHandler::new(store.clone()),
            stock: StockAggregator::new(ledger, Arc::clone(&clock)),
            customers: CustomerLedger::new(store, Arc::clone(&clock), config.retry),
            catalog,
            clock,
            config,
        }
    }

    pub fn ledger(&self) -> &BatchLedger<S> {
        self.stock.ledger()
    }

    pub fn stock(&self) -> &StockAggregator<S> {
        &self.stock
    }

    pub fn customers(&self) -> &CustomerLedger<S> {
        &self.customers
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.orders.require(order_id.stream(), "order").await
    }

    /// Places an order, consuming each line from its FEFO batch.
    ///
    /// Fails with `OutOfStock` if any product has no usable batch or its
    /// FEFO batch cannot cover the line; nothing is written in that case.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, customer_id = %cmd.customer_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        let lines = merge_lines(&cmd.lines)?;
        let delivery_fee = cmd
            .delivery_fee
            .unwrap_or(self.config.default_delivery_fee);
        let order_id = cmd.order_id;
        let cmd = &cmd;
        let lines = &lines;

        let order = retry_on_conflict(self.config.retry, "create_order", move || async move {
            let now = self.clock.now();
            let order = self.orders.load(order_id.stream()).await?;
            let customer = self.customers.require(cmd.customer_id).await?;

            let mut items = Vec::with_capacity(lines.len());
            let mut batches = Vec::with_capacity(lines.len());
            for line in lines {
                let product = self.catalog.require_product(&line.product_id).await?;
                let Some(batch) = self.stock.select_fefo_batch(&line.product_id).await? else {
                    return Err(out_of_stock(&line.product_id, line.quantity, 0));
                };
                if line.quantity > batch.remaining() {
                    return Err(out_of_stock(
                        &line.product_id,
                        line.quantity,
                        batch.remaining(),
                    ));
                }
                items.push(self.price_line(&product, &batch, line.quantity, now).await?);
                batches.push(batch);
            }

            let events = order.place(OrderPlacedData {
                order_id,
                customer_id: cmd.customer_id,
                items,
                delivery_fee,
                payment_method: cmd.payment_method.clone(),
                delivery_address: cmd.delivery_address.clone(),
                placed_at: now,
            })?;

            let mut uow = UnitOfWork::new();
            let placed = self.stage_order(&mut uow, order_id, &order, events, now)?;
            let step = placed.version();
            for (batch, item) in batches.iter().zip(placed.items()) {
                self.stage_batch_delta(&mut uow, batch, -i64::from(item.quantity), order_id, step)?;
            }
            if let Some(posting) = self.customers.stage_posting(
                &customer,
                CustomerDelta::order_placed(order_id, placed.total()),
            )? {
                uow.push(posting);
            }

            self.commit(uow, "create_order").await?;
            Ok::<_, DomainError>(placed)
        })
        .await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            %order_id,
            total = %order.total(),
            lines = order.items().len(),
            "order created"
        );
        Ok(order)
    }

    /// Replaces the lines of a pending cash-on-delivery order.
    ///
    /// Stock is reconciled per batch: each batch in the old or new line
    /// list receives `old - new` in a single posting, so a batch that
    /// keeps some of its quantity is never released and re-reserved.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn update_order(&self, cmd: UpdateOrder) -> Result<Order, DomainError> {
        validate_edit_lines(&cmd.lines)?;
        let order_id = cmd.order_id;
        let lines = &cmd.lines;

        let (order, changed) =
            retry_on_conflict(self.config.retry, "update_order", move || async move {
                let now = self.clock.now();
                let order = self.get_order(order_id).await?;
                order.ensure_modifiable()?;

                let held = order.batch_quantities();
                let mut batches = BTreeMap::new();
                let resolved = self.resolve_edit_lines(lines, &held, &mut batches).await?;

                let new_totals = quantities_by_batch(&resolved);
                let today = self.stock.today();
                for (batch_id, &new_qty) in &new_totals {
                    let old_qty = held.get(batch_id).copied().unwrap_or(0);
                    let batch = cached(&batches, *batch_id)?;
                    let extra = if batch.is_expired(today) { 0 } else { batch.remaining() };
                    if new_qty > old_qty && new_qty - old_qty > extra {
                        return Err(out_of_stock(batch.product_id(), new_qty, old_qty + extra));
                    }
                }

                let mut items = Vec::with_capacity(resolved.len());
                for (product_id, batch_id, quantity) in &resolved {
                    let retained = order
                        .items()
                        .iter()
                        .find(|i| &i.product_id == product_id && i.batch_id == *batch_id);
                    let item = match retained {
                        Some(previous) => previous.with_quantity(*quantity),
                        None => {
                            let product = self.catalog.require_product(product_id).await?;
                            let batch = cached(&batches, *batch_id)?;
                            self.price_line(&product, batch, *quantity, now).await?
                        }
                    };
                    items.push(item);
                }

                let events = order.revise_items(items, now)?;
                if events.is_empty() {
                    return Ok((order, false));
                }

                let mut uow = UnitOfWork::new();
                let revised = self.stage_order(&mut uow, order_id, &order, events, now)?;
                let step = revised.version();

                for batch_id in held.keys() {
                    if !batches.contains_key(batch_id) {
                        let batch = self.ledger().require_batch(*batch_id).await?;
                        batches.insert(*batch_id, batch);
                    }
                }
                let touched: BTreeSet<BatchId> =
                    held.keys().chain(new_totals.keys()).copied().collect();
                for batch_id in touched {
                    let old_qty = i64::from(held.get(&batch_id).copied().unwrap_or(0));
                    let new_qty = i64::from(new_totals.get(&batch_id).copied().unwrap_or(0));
                    if old_qty != new_qty {
                        let batch = cached(&batches, batch_id)?;
                        self.stage_batch_delta(&mut uow, batch, old_qty - new_qty, order_id, step)?;
                    }
                }

                if revised.total() != order.total() {
                    let customer = self.customers.require(order.customer_id()).await?;
                    if let Some(posting) = self.customers.stage_posting(
                        &customer,
                        CustomerDelta::order_revised(order_id, order.total(), revised.total()),
                    )? {
                        uow.push(posting);
                    }
                }

                self.commit(uow, "update_order").await?;
                Ok::<_, DomainError>((revised, true))
            })
            .await?;

        if changed {
            metrics::counter!("orders_updated_total").increment(1);
            tracing::info!(%order_id, total = %order.total(), "order updated");
        } else {
            tracing::debug!(%order_id, "order unchanged");
        }
        Ok(order)
    }

    /// Cancels a pending cash-on-delivery order, returning every unit to
    /// its batch and removing the order from the customer's totals.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, DomainError> {
        let reason = &reason;

        let order = retry_on_conflict(self.config.retry, "cancel_order", move || async move {
            let now = self.clock.now();
            let order = self.get_order(order_id).await?;
            let events = order.cancel(reason.clone(), now)?;

            let mut uow = UnitOfWork::new();
            let cancelled = self.stage_order(&mut uow, order_id, &order, events, now)?;
            let step = cancelled.version();

            for (batch_id, quantity) in order.batch_quantities() {
                let batch = self.ledger().require_batch(batch_id).await?;
                self.stage_batch_delta(&mut uow, &batch, i64::from(quantity), order_id, step)?;
            }

            let customer = self.customers.require(order.customer_id()).await?;
            if let Some(posting) = self.customers.stage_posting(
                &customer,
                CustomerDelta::order_cancelled(order_id, order.total()),
            )? {
                uow.push(posting);
            }

            self.commit(uow, "cancel_order").await?;
            Ok::<_, DomainError>(cancelled)
        })
        .await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, "order cancelled");
        Ok(order)
    }

    /// Records a fulfilment status change. `Delivered` stamps the delivery
    /// time. `Cancelled` is handled by [`cancel_order`](Self::cancel_order),
    /// so stock and customer totals are reconciled or the request fails.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, DomainError> {
        if status == OrderStatus::Cancelled {
            return self.cancel_order(order_id, note).await;
        }

        let policy = self.config.transition_policy;
        let order = self
            .change_order("update_order_status", order_id, |order, now| {
                order.change_status(status, policy, note.clone(), now)
            })
            .await?;

        if let Some(change) = order.status_history().last().filter(|c| c.overridden) {
            tracing::warn!(%order_id, to = %change.status, "order status set by operator override");
        }
        metrics::counter!("order_status_changes_total", "kind" => "order").increment(1);
        tracing::info!(%order_id, %status, "order status updated");
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
        note: Option<String>,
    ) -> Result<Order, DomainError> {
        let policy = self.config.transition_policy;
        let order = self
            .change_order("update_payment_status", order_id, |order, now| {
                order.change_payment_status(status, policy, note.clone(), now)
            })
            .await?;

        if let Some(change) = order
            .payment_status_history()
            .last()
            .filter(|c| c.overridden)
        {
            tracing::warn!(%order_id, to = %change.status, "payment status set by operator override");
        }
        metrics::counter!("order_status_changes_total", "kind" => "payment").increment(1);
        tracing::info!(%order_id, %status, "payment status updated");
        Ok(order)
    }
}

// Helpers
impl<S, C> OrderService<S, C>
where
    S: EventStore + Clone,
    C: Catalog,
{
    /// Single-stream order change with conflict retries.
    async fn change_order<F>(
        &self,
        operation: &'static str,
        order_id: OrderId,
        decide: F,
    ) -> Result<Order, DomainError>
    where
        F: Fn(&Order, DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> + Sync,
    {
        let decide = &decide;
        retry_on_conflict(self.config.retry, operation, move || async move {
            let now = self.clock.now();
            let order = self.get_order(order_id).await?;
            let events = decide(&order, now)?;

            if events.is_empty() {
                return Ok(order);
            }

            let mut uow = UnitOfWork::new();
            let order = self.stage_order(&mut uow, order_id, &order, events, now)?;
            self.commit(uow, operation).await?;
            Ok::<_, DomainError>(order)
        })
        .await
    }

    /// Prices `quantity` units from `batch` with the best discount in
    /// effect at `at`.
    async fn price_line(
        &self,
        product: &Product,
        batch: &Batch,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> Result<OrderItem, DomainError> {
        let batch_id = batch_id_of(batch)?;
        let discounts = self.catalog.discounts_for(product).await?;
        let applied = best_applicable_discount(
            &discounts,
            &product.id,
            &product.category_ids,
            batch.price(),
            at,
        )
        .map_or(DiscountValue::NONE, |d| d.value);

        Ok(OrderItem::priced(
            product.id.clone(),
            product.name.clone(),
            batch_id,
            quantity,
            batch.price(),
            applied,
        ))
    }

    /// Maps each edit line to a batch and merges lines that land on the
    /// same product and batch. Batches read along the way are cached in
    /// `batches`.
    async fn resolve_edit_lines(
        &self,
        lines: &[EditLine],
        held: &BTreeMap<BatchId, u32>,
        batches: &mut BTreeMap<BatchId, Batch>,
    ) -> Result<Vec<(ProductId, BatchId, u32)>, DomainError> {
        let today = self.stock.today();
        let mut resolved: Vec<(ProductId, BatchId, u32)> = Vec::with_capacity(lines.len());

        for line in lines {
            let batch = match line.batch_id {
                Some(batch_id) => match batches.get(&batch_id) {
                    Some(batch) => batch.clone(),
                    None => self.ledger().require_batch(batch_id).await?,
                },
                None => {
                    let candidates = self.ledger().batches_for_product(&line.product_id).await?;
                    let available = |b: &Batch| {
                        let own = b
                            .batch_id()
                            .and_then(|id| held.get(&id).copied())
                            .unwrap_or(0);
                        b.remaining() + own
                    };
                    let Some(batch) = fefo_order_by(candidates, today, available)
                        .into_iter()
                        .next()
                    else {
                        return Err(out_of_stock(&line.product_id, line.quantity, 0));
                    };
                    batch
                }
            };

            if batch.product_id() != &line.product_id {
                return Err(DomainError::Validation(format!(
                    "batch {} holds {}, not {}",
                    batch.batch_code(),
                    batch.product_id(),
                    line.product_id
                )));
            }

            let batch_id = batch_id_of(&batch)?;
            match resolved
                .iter_mut()
                .find(|(p, b, _)| p == &line.product_id && *b == batch_id)
            {
                Some((_, _, quantity)) => {
                    *quantity = quantity.checked_add(line.quantity).ok_or_else(|| {
                        DomainError::Validation(format!("quantity overflow for {}", line.product_id))
                    })?;
                }
                None => resolved.push((line.product_id.clone(), batch_id, line.quantity)),
            }
            batches.insert(batch_id, batch);
        }

        Ok(resolved)
    }

    /// Stages the order's events; the caller always has events to write.
    fn stage_order(
        &self,
        uow: &mut UnitOfWork,
        order_id: OrderId,
        order: &Order,
        events: Vec<OrderEvent>,
        now: DateTime<Utc>,
    ) -> Result<Order, DomainError> {
        let staged = self
            .orders
            .stage(order_id.stream(), order, events, now)?
            .ok_or_else(|| DomainError::Invariant("order change produced no events".into()))?;
        Ok(uow.push(staged))
    }

    /// Stages one ledger posting keyed by order, step and batch so a
    /// replayed step cannot apply twice.
    fn stage_batch_delta(
        &self,
        uow: &mut UnitOfWork,
        batch: &Batch,
        delta: i64,
        order_id: OrderId,
        step: Version,
    ) -> Result<(), DomainError> {
        let batch_id = batch_id_of(batch)?;
        let key = format!("order:{order_id}:{}:{batch_id}", step.as_i64());
        if let Some(staged) = self.ledger().stage_adjustment(batch, delta, &key)? {
            uow.push(staged);
            tracing::debug!(%batch_id, delta, "batch posting staged");
        }
        Ok(())
    }

    async fn commit(&self, uow: UnitOfWork, operation: &'static str) -> Result<(), DomainError> {
        let streams = uow.len();
        let started = Instant::now();
        let result = uow.commit(self.orders.store()).await;
        metrics::histogram!("order_commit_duration_seconds", "operation" => operation)
            .record(started.elapsed().as_secs_f64());
        result?;
        tracing::debug!(operation, streams, "commit applied");
        Ok(())
    }
}

/// Merges repeated products into one line, keeping first-seen order.
fn merge_lines(lines: &[OrderLine]) -> Result<Vec<OrderLine>, DomainError> {
    if lines.is_empty() {
        return Err(OrderError::NoItems.into());
    }

    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id.clone(),
                quantity: 0,
            }
            .into());
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    DomainError::Validation(format!("quantity overflow for {}", line.product_id))
                })?;
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

fn validate_edit_lines(lines: &[EditLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(OrderError::NoItems.into());
    }
    if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
        return Err(OrderError::InvalidQuantity {
            product_id: line.product_id.clone(),
            quantity: 0,
        }
        .into());
    }
    Ok(())
}

fn quantities_by_batch(resolved: &[(ProductId, BatchId, u32)]) -> BTreeMap<BatchId, u32> {
    let mut totals = BTreeMap::new();
    for (_, batch_id, quantity) in resolved {
        *totals.entry(*batch_id).or_insert(0) += quantity;
    }
    totals
}

fn cached(batches: &BTreeMap<BatchId, Batch>, batch_id: BatchId) -> Result<&Batch, DomainError> {
    batches
        .get(&batch_id)
        .ok_or_else(|| DomainError::not_found("batch", batch_id))
}

fn batch_id_of(batch: &Batch) -> Result<BatchId, DomainError> {
    batch
        .batch_id()
        .ok_or_else(|| DomainError::Invariant("batch without an id".into()))
}

fn out_of_stock(product_id: &ProductId, requested: u32, available: u32) -> DomainError {
    DomainError::OutOfStock {
        product_id: product_id.clone(),
        requested,
        available,
    }
}
