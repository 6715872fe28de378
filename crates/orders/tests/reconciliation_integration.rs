//! End-to-end reconciliation tests over the in-memory store.
//!
//! Every test drives the engine through its public API and then checks
//! batches, orders and customer totals as the ledger sees them.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use common::{Clock, FixedClock};
use domain::{
    Aggregate, BatchId, CategoryId, CustomerId, DiscountId, DomainError, EngineConfig, Money, OrderId,
    Percentage, ProductId, RetryPolicy, TransitionPolicy,
};
use event_store::{EventStore, InMemoryEventStore, Version};
use inventory::{
    Discount, DiscountScope, DiscountValue, InMemoryCatalog, Product, ReceiveBatch,
};
use orders::{
    CreateOrder, DeliveryAddress, EditLine, Order, OrderService, OrderStatus, PaymentMethod,
    PaymentStatus, UpdateOrder,
};

type Service = OrderService<InMemoryEventStore, InMemoryCatalog>;

struct Engine {
    store: InMemoryEventStore,
    catalog: InMemoryCatalog,
    service: Service,
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_attempts: 10,
            backoff: std::time::Duration::from_millis(1),
        },
        ..EngineConfig::default()
    }
}

fn engine_with(config: EngineConfig) -> Engine {
    let store = InMemoryEventStore::new();
    let catalog = InMemoryCatalog::new();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now()));
    let service = OrderService::new(store.clone(), catalog.clone(), clock, config);
    Engine {
        store,
        catalog,
        service,
    }
}

fn engine() -> Engine {
    engine_with(config())
}

fn address() -> DeliveryAddress {
    DeliveryAddress::new("Ana Lima", "555-0100", "12 Market St", "Springfield")
}

fn category_discount(id: &str, category: &str, percent: u32) -> Discount {
    Discount {
        id: DiscountId::new(id),
        name: format!("{percent}% off {category}"),
        value: DiscountValue::Percentage {
            rate: Percentage::from_percent(percent),
        },
        applicable_to: DiscountScope::Categories,
        applicable_product_ids: vec![],
        applicable_category_ids: vec![CategoryId::new(category)],
        start_date: now() - Duration::days(7),
        end_date: now() + Duration::days(7),
        is_active: true,
        current_usage_count: 0,
    }
}

impl Engine {
    async fn product(&self, id: &str, category: &str) {
        self.catalog
            .upsert_product(Product::new(id, id.to_uppercase()).with_category(category))
            .await;
    }

    async fn batch(&self, code: &str, product: &str, expiry: NaiveDate, quantity: u32) -> BatchId {
        self.batch_priced(code, product, expiry, quantity, 100).await
    }

    async fn batch_priced(
        &self,
        code: &str,
        product: &str,
        expiry: NaiveDate,
        quantity: u32,
        price: i64,
    ) -> BatchId {
        self.service
            .ledger()
            .receive_batch(ReceiveBatch::new(
                code,
                product,
                date(2025, 1, 1),
                expiry,
                quantity,
                Money::from_major(price),
            ))
            .await
            .unwrap()
            .batch_id()
            .unwrap()
    }

    async fn customer(&self) -> CustomerId {
        self.service
            .customers()
            .register("Ana Lima", "ana@example.com")
            .await
            .unwrap()
            .customer_id()
            .unwrap()
    }

    async fn remaining(&self, batch_id: BatchId) -> u32 {
        self.service
            .ledger()
            .require_batch(batch_id)
            .await
            .unwrap()
            .remaining()
    }

    async fn customer_totals(&self, customer_id: CustomerId) -> (u32, Money) {
        let customer = self
            .service
            .customers()
            .get_by_id(customer_id)
            .await
            .unwrap()
            .unwrap();
        (customer.total_orders(), customer.total_spent())
    }

    async fn order(&self, customer_id: CustomerId, product: &str, quantity: u32) -> Order {
        self.service
            .create_order(CreateOrder::new(customer_id, address()).with_line(product, quantity))
            .await
            .unwrap()
    }
}

fn assert_balanced(order: &Order) {
    let item_subtotals: Money = order.items().iter().map(|i| i.subtotal).sum();
    let item_discounts: Money = order.items().iter().map(|i| i.discount).sum();
    assert_eq!(
        order.total(),
        order.subtotal() - order.discount() + order.delivery_fee()
    );
    assert_eq!(order.subtotal(), item_subtotals + item_discounts);
    assert_eq!(order.discount(), item_discounts);
}

mod create {
    use super::*;

    #[tokio::test]
    async fn discounted_line_from_single_batch() {
        let e = engine();
        e.product("P", "pantry").await;
        e.catalog
            .upsert_discount(category_discount("pantry10", "pantry", 10))
            .await;
        let batch = e.batch("LOT-P", "P", date(2025, 12, 31), 5).await;
        let customer = e.customer().await;

        let order = e.order(customer, "P", 2).await;

        let item = &order.items()[0];
        assert_eq!(item.unit_price, Money::from_major(100));
        assert_eq!(item.discount, Money::from_major(20));
        assert_eq!(item.subtotal, Money::from_major(180));
        assert_eq!(item.batch_id, batch);
        assert_eq!(order.subtotal(), Money::from_major(200));
        assert_eq!(order.total(), Money::from_major(180));
        assert_balanced(&order);

        assert_eq!(e.remaining(batch).await, 3);
        assert_eq!(
            e.customer_totals(customer).await,
            (1, Money::from_major(180))
        );
    }

    #[tokio::test]
    async fn winning_fixed_discount_is_charged_exactly() {
        let e = engine();
        e.product("jam", "pantry").await;
        let one_off = DiscountValue::Fixed {
            amount: Money::from_major(1),
        };
        e.catalog
            .upsert_discount(Discount {
                name: "1.00 off jam".into(),
                value: one_off,
                applicable_to: DiscountScope::Products,
                applicable_product_ids: vec![ProductId::new("jam")],
                applicable_category_ids: vec![],
                ..category_discount("jam-1", "pantry", 0)
            })
            .await;
        e.catalog
            .upsert_discount(category_discount("pantry30", "pantry", 30))
            .await;
        let batch = e
            .batch_priced("J", "jam", date(2025, 12, 31), 10_000, 3)
            .await;
        let customer = e.customer().await;

        let order = e.order(customer, "jam", 10_000).await;

        // 1.00 off 3.00 beats 30%, and is charged as 1.00 per unit
        let item = &order.items()[0];
        assert_eq!(item.applied_discount, one_off);
        assert_eq!(item.discount, Money::from_major(10_000));
        assert_eq!(item.subtotal, Money::from_major(20_000));
        assert_eq!(order.total(), Money::from_major(20_000));
        assert_balanced(&order);
        assert_eq!(e.remaining(batch).await, 0);
        assert_eq!(
            e.customer_totals(customer).await,
            (1, Money::from_major(20_000))
        );
    }

    #[tokio::test]
    async fn consumes_the_earliest_expiring_batch() {
        let e = engine();
        e.product("milk", "dairy").await;
        let jan = e.batch("JAN", "milk", date(2026, 1, 1), 5).await;
        let jun = e.batch("JUN", "milk", date(2026, 6, 1), 5).await;
        let dec = e.batch("DEC", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;

        let order = e.order(customer, "milk", 1).await;

        assert_eq!(order.items()[0].batch_id, dec);
        assert_eq!(e.remaining(dec).await, 4);
        assert_eq!(e.remaining(jan).await, 5);
        assert_eq!(e.remaining(jun).await, 5);
    }

    #[tokio::test]
    async fn repeated_products_become_one_line() {
        let e = engine();
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;

        let order = e
            .service
            .create_order(
                CreateOrder::new(customer, address())
                    .with_line("milk", 1)
                    .with_line("milk", 2),
            )
            .await
            .unwrap();

        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity, 3);
        assert_eq!(e.remaining(batch).await, 2);
    }

    #[tokio::test]
    async fn delivery_fee_defaults_from_config() {
        let e = engine_with(EngineConfig {
            default_delivery_fee: Money::from_major(7),
            ..config()
        });
        e.product("milk", "dairy").await;
        e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;

        let defaulted = e.order(customer, "milk", 1).await;
        assert_eq!(defaulted.delivery_fee(), Money::from_major(7));
        assert_eq!(defaulted.total(), Money::from_major(107));

        let explicit = e
            .service
            .create_order(
                CreateOrder::new(customer, address())
                    .with_line("milk", 1)
                    .with_delivery_fee(Money::zero()),
            )
            .await
            .unwrap();
        assert_eq!(explicit.total(), Money::from_major(100));
        assert_balanced(&explicit);
    }

    #[tokio::test]
    async fn fefo_batch_short_of_stock_aborts_everything() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.product("bread", "bakery").await;
        let milk = e.batch("M", "milk", date(2025, 12, 1), 5).await;
        let bread = e.batch("B", "bread", date(2025, 12, 1), 2).await;
        let customer = e.customer().await;
        let cmd = CreateOrder::new(customer, address())
            .with_line("milk", 2)
            .with_line("bread", 3);
        let order_id = cmd.order_id;

        let result = e.service.create_order(cmd).await;

        assert!(matches!(
            result,
            Err(DomainError::OutOfStock {
                requested: 3,
                available: 2,
                ..
            })
        ));
        assert_eq!(e.remaining(milk).await, 5);
        assert_eq!(e.remaining(bread).await, 2);
        assert_eq!(e.customer_totals(customer).await, (0, Money::zero()));
        assert!(matches!(
            e.service.get_order(order_id).await,
            Err(DomainError::NotFound { entity: "order", .. })
        ));
    }

    #[tokio::test]
    async fn expired_stock_is_not_sold() {
        let e = engine();
        e.product("milk", "dairy").await;
        let stale = e.batch("OLD", "milk", date(2025, 5, 31), 5).await;
        let customer = e.customer().await;

        let result = e
            .service
            .create_order(CreateOrder::new(customer, address()).with_line("milk", 1))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::OutOfStock { available: 0, .. })
        ));
        assert_eq!(e.remaining(stale).await, 5);
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;

        let no_product = e
            .service
            .create_order(CreateOrder::new(customer, address()).with_line("ghost", 1))
            .await;
        assert!(matches!(
            no_product,
            Err(DomainError::NotFound {
                entity: "product",
                ..
            })
        ));

        let no_customer = e
            .service
            .create_order(CreateOrder::new(CustomerId::new(), address()).with_line("milk", 1))
            .await;
        assert!(matches!(
            no_customer,
            Err(DomainError::NotFound {
                entity: "customer",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn postings_carry_replay_safe_keys() {
        let e = engine();
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;
        let order = e.order(customer, "milk", 2).await;
        let order_id = order.order_id().unwrap();

        let replay = e
            .service
            .ledger()
            .adjust_quantity(batch, -2, &format!("order:{order_id}:1:{batch}"))
            .await
            .unwrap();

        assert_eq!(replay.remaining(), 3);
    }
}

mod cancel {
    use super::*;

    #[tokio::test]
    async fn create_then_cancel_restores_everything() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.product("bread", "bakery").await;
        e.catalog
            .upsert_discount(category_discount("dairy15", "dairy", 15))
            .await;
        let milk = e.batch("M", "milk", date(2025, 12, 1), 5).await;
        let bread = e.batch("B", "bread", date(2025, 12, 1), 4).await;
        let customer = e.customer().await;
        e.order(customer, "bread", 1).await;
        let before = e.customer_totals(customer).await;

        let order = e
            .service
            .create_order(
                CreateOrder::new(customer, address())
                    .with_line("milk", 3)
                    .with_line("bread", 2)
                    .with_delivery_fee(Money::from_cents(499)),
            )
            .await
            .unwrap();
        let order_id = order.order_id().unwrap();
        assert_eq!(e.remaining(milk).await, 2);
        assert_eq!(e.remaining(bread).await, 1);

        let cancelled = e
            .service
            .cancel_order(order_id, Some("customer request".into()))
            .await
            .unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(e.remaining(milk).await, 5);
        assert_eq!(e.remaining(bread).await, 3);
        assert_eq!(e.customer_totals(customer).await, before);
    }

    #[tokio::test]
    async fn cancelled_order_cannot_be_cancelled_again() {
        let e = engine();
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;
        let order_id = e.order(customer, "milk", 2).await.order_id().unwrap();

        e.service.cancel_order(order_id, None).await.unwrap();
        let again = e.service.cancel_order(order_id, None).await;

        assert!(matches!(again, Err(DomainError::InvalidState(_))));
        assert_eq!(e.remaining(batch).await, 5);
        assert_eq!(e.customer_totals(customer).await, (0, Money::zero()));
    }

    #[tokio::test]
    async fn cancelled_status_reconciles_like_cancel() {
        let e = engine();
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;
        let order_id = e.order(customer, "milk", 2).await.order_id().unwrap();
        assert_eq!(e.remaining(batch).await, 3);

        let order = e
            .service
            .update_order_status(order_id, OrderStatus::Cancelled, Some("no show".into()))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(e.remaining(batch).await, 5);
        assert_eq!(e.customer_totals(customer).await, (0, Money::zero()));
        let again = e.service.cancel_order(order_id, None).await;
        assert!(matches!(again, Err(DomainError::InvalidState(_))));
        assert_eq!(e.remaining(batch).await, 5);
    }

    #[tokio::test]
    async fn cancelled_status_on_confirmed_order_is_refused() {
        let e = engine_with(EngineConfig {
            transition_policy: TransitionPolicy::OperatorOverride,
            ..config()
        });
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;
        let order_id = e.order(customer, "milk", 2).await.order_id().unwrap();
        e.service
            .update_order_status(order_id, OrderStatus::Confirmed, None)
            .await
            .unwrap();

        let result = e
            .service
            .update_order_status(order_id, OrderStatus::Cancelled, None)
            .await;

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
        let order = e.service.get_order(order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(e.remaining(batch).await, 3);
        assert_eq!(
            e.customer_totals(customer).await,
            (1, Money::from_major(200))
        );
    }

    #[tokio::test]
    async fn online_and_confirmed_orders_cannot_be_cancelled() {
        let e = engine();
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;

        let online = e
            .service
            .create_order(
                CreateOrder::new(customer, address())
                    .with_line("milk", 1)
                    .with_payment_method(PaymentMethod::Online {
                        provider: "card".into(),
                    }),
            )
            .await
            .unwrap();
        let result = e
            .service
            .cancel_order(online.order_id().unwrap(), None)
            .await;
        assert!(matches!(result, Err(DomainError::InvalidState(_))));

        let confirmed = e.order(customer, "milk", 1).await.order_id().unwrap();
        e.service
            .update_order_status(confirmed, OrderStatus::Confirmed, None)
            .await
            .unwrap();
        let result = e.service.cancel_order(confirmed, None).await;
        assert!(matches!(result, Err(DomainError::InvalidState(_))));

        assert_eq!(e.remaining(batch).await, 3);
    }
}

mod edit {
    use super::*;

    #[tokio::test]
    async fn nets_each_batch_once() {
        let e = engine();
        e.product("milk", "dairy").await;
        let a = e.batch("A", "milk", date(2025, 12, 1), 5).await;
        let b = e.batch("B", "milk", date(2026, 1, 1), 5).await;
        let customer = e.customer().await;
        let order = e.order(customer, "milk", 3).await;
        assert_eq!(order.items()[0].batch_id, a);
        assert_eq!(e.remaining(a).await, 2);

        let revised = e
            .service
            .update_order(
                UpdateOrder::new(order.order_id().unwrap())
                    .with_line(EditLine::from_batch("milk", a, 1))
                    .with_line(EditLine::from_batch("milk", b, 2)),
            )
            .await
            .unwrap();

        assert_eq!(e.remaining(a).await, 4);
        assert_eq!(e.remaining(b).await, 3);
        assert_eq!(revised.items().len(), 2);
        assert_balanced(&revised);

        // received, create posting, one edit posting
        assert_eq!(
            e.store.stream_version(a.stream()).await.unwrap(),
            Some(Version::new(3))
        );
        assert_eq!(
            e.store.stream_version(b.stream()).await.unwrap(),
            Some(Version::new(2))
        );
    }

    #[tokio::test]
    async fn batches_dropped_from_the_order_are_released() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.product("bread", "bakery").await;
        let milk = e.batch("M", "milk", date(2025, 12, 1), 5).await;
        let bread = e.batch("B", "bread", date(2025, 12, 1), 5).await;
        let customer = e.customer().await;
        let order = e
            .service
            .create_order(
                CreateOrder::new(customer, address())
                    .with_line("milk", 2)
                    .with_line("bread", 1),
            )
            .await
            .unwrap();

        e.service
            .update_order(
                UpdateOrder::new(order.order_id().unwrap()).with_line(EditLine::new("bread", 4)),
            )
            .await
            .unwrap();

        assert_eq!(e.remaining(milk).await, 5);
        assert_eq!(e.remaining(bread).await, 1);
    }

    #[tokio::test]
    async fn fefo_counts_stock_the_order_already_holds() {
        let e = engine();
        e.product("milk", "dairy").await;
        let a = e.batch("A", "milk", date(2025, 12, 1), 2).await;
        let b = e.batch("B", "milk", date(2026, 1, 1), 5).await;
        let customer = e.customer().await;
        let order = e.order(customer, "milk", 2).await;
        assert_eq!(e.remaining(a).await, 0);

        let revised = e
            .service
            .update_order(
                UpdateOrder::new(order.order_id().unwrap()).with_line(EditLine::new("milk", 1)),
            )
            .await
            .unwrap();

        assert_eq!(revised.items()[0].batch_id, a);
        assert_eq!(e.remaining(a).await, 1);
        assert_eq!(e.remaining(b).await, 5);
    }

    #[tokio::test]
    async fn retained_lines_keep_their_price() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.product("bread", "bakery").await;
        e.catalog
            .upsert_discount(category_discount("dairy10", "dairy", 10))
            .await;
        let milk = e.batch("M", "milk", date(2025, 12, 1), 10).await;
        e.batch_priced("B", "bread", date(2025, 12, 1), 10, 4).await;
        let customer = e.customer().await;
        let order = e.order(customer, "milk", 2).await;
        assert_eq!(e.customer_totals(customer).await.1, Money::from_major(180));

        // the promotion ends before the edit
        e.catalog
            .upsert_discount(Discount {
                is_active: false,
                ..category_discount("dairy10", "dairy", 10)
            })
            .await;

        let revised = e
            .service
            .update_order(
                UpdateOrder::new(order.order_id().unwrap())
                    .with_line(EditLine::from_batch("milk", milk, 4))
                    .with_line(EditLine::new("bread", 5)),
            )
            .await
            .unwrap();

        let milk_line = revised
            .items()
            .iter()
            .find(|i| i.product_id == ProductId::new("milk"))
            .unwrap();
        assert_eq!(milk_line.discount_rate, Percentage::from_percent(10));
        assert_eq!(milk_line.subtotal, Money::from_major(360));
        assert_eq!(revised.total(), Money::from_major(380));
        assert_balanced(&revised);
        assert_eq!(
            e.customer_totals(customer).await,
            (1, Money::from_major(380))
        );
    }

    #[tokio::test]
    async fn over_asking_leaves_state_untouched() {
        let e = engine();
        e.product("milk", "dairy").await;
        let a = e.batch("A", "milk", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;
        let order = e.order(customer, "milk", 2).await;
        let order_id = order.order_id().unwrap();

        let result = e
            .service
            .update_order(UpdateOrder::new(order_id).with_line(EditLine::from_batch("milk", a, 4)))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::OutOfStock {
                requested: 4,
                available: 3,
                ..
            })
        ));
        assert_eq!(e.remaining(a).await, 1);
        assert_eq!(e.service.get_order(order_id).await.unwrap().items()[0].quantity, 2);
    }

    #[tokio::test]
    async fn batch_of_another_product_is_rejected() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.product("bread", "bakery").await;
        e.batch("M", "milk", date(2025, 12, 1), 3).await;
        let bread = e.batch("B", "bread", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;
        let order = e.order(customer, "milk", 1).await;

        let result = e
            .service
            .update_order(
                UpdateOrder::new(order.order_id().unwrap())
                    .with_line(EditLine::from_batch("milk", bread, 1)),
            )
            .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn paid_orders_are_frozen() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.batch("A", "milk", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;
        let order_id = e.order(customer, "milk", 1).await.order_id().unwrap();
        e.service
            .update_payment_status(order_id, PaymentStatus::Paid, None)
            .await
            .unwrap();

        let result = e
            .service
            .update_order(UpdateOrder::new(order_id).with_line(EditLine::new("milk", 2)))
            .await;

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn unchanged_lines_write_nothing() {
        let e = engine();
        e.product("milk", "dairy").await;
        let a = e.batch("A", "milk", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;
        let order_id = e.order(customer, "milk", 1).await.order_id().unwrap();
        let events_before = e.store.event_count().await;

        e.service
            .update_order(UpdateOrder::new(order_id).with_line(EditLine::from_batch("milk", a, 1)))
            .await
            .unwrap();

        assert_eq!(e.store.event_count().await, events_before);
    }
}

mod status {
    use super::*;

    #[tokio::test]
    async fn delivery_is_stamped() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.batch("A", "milk", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;
        let order_id = e.order(customer, "milk", 1).await.order_id().unwrap();

        for status in [
            OrderStatus::PendingConfirmation,
            OrderStatus::Confirmed,
            OrderStatus::Delivered,
        ] {
            e.service
                .update_order_status(order_id, status, None)
                .await
                .unwrap();
        }

        let order = e.service.get_order(order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.delivered_at(), Some(now()));
        let statuses: Vec<_> = order.status_history().iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Pending,
                OrderStatus::PendingConfirmation,
                OrderStatus::Confirmed,
                OrderStatus::Delivered,
            ]
        );
    }

    #[tokio::test]
    async fn strict_policy_rejects_backwards_moves() {
        let e = engine();
        e.product("milk", "dairy").await;
        e.batch("A", "milk", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;
        let order_id = e.order(customer, "milk", 1).await.order_id().unwrap();
        e.service
            .update_order_status(order_id, OrderStatus::Confirmed, None)
            .await
            .unwrap();

        let result = e
            .service
            .update_order_status(order_id, OrderStatus::Pending, None)
            .await;

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn override_policy_records_any_move() {
        let e = engine_with(EngineConfig {
            transition_policy: TransitionPolicy::OperatorOverride,
            ..config()
        });
        e.product("milk", "dairy").await;
        e.batch("A", "milk", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;
        let order_id = e.order(customer, "milk", 1).await.order_id().unwrap();

        let order = e
            .service
            .update_payment_status(order_id, PaymentStatus::Paid, Some("bank transfer".into()))
            .await
            .unwrap();
        let order = e
            .service
            .update_payment_status(order.order_id().unwrap(), PaymentStatus::Pending, None)
            .await
            .unwrap();

        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        let history = order.payment_status_history();
        assert_eq!(history.len(), 3);
        assert!(!history[1].overridden);
        assert_eq!(history[1].note.as_deref(), Some("bank transfer"));
        assert!(history[2].overridden);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let e = engine();
        let result = e
            .service
            .update_order_status(OrderId::new(), OrderStatus::Confirmed, None)
            .await;
        assert!(matches!(
            result,
            Err(DomainError::NotFound { entity: "order", .. })
        ));
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_unit_goes_to_exactly_one_order() {
        let e = engine();
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 1).await;
        let first = e.customer().await;
        let second = e.customer().await;
        let service = Arc::new(e.service);

        let spawn = |customer: CustomerId| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .create_order(CreateOrder::new(customer, address()).with_line("milk", 1))
                    .await
            })
        };
        let (a, b) = (spawn(first), spawn(second));
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(DomainError::OutOfStock { .. } | DomainError::ConcurrencyConflict { .. })
        )));
        assert_eq!(
            service.ledger().require_batch(batch).await.unwrap().remaining(),
            0
        );

        let mut total = 0;
        for customer in [first, second] {
            total += service
                .customers()
                .get_by_id(customer)
                .await
                .unwrap()
                .unwrap()
                .total_orders();
        }
        assert_eq!(total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_orders_drain_a_batch_exactly() {
        let e = engine_with(EngineConfig {
            retry: RetryPolicy {
                max_attempts: 50,
                backoff: std::time::Duration::from_millis(1),
            },
            ..config()
        });
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 6).await;
        let customer = e.customer().await;
        let service = Arc::new(e.service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .create_order(CreateOrder::new(customer, address()).with_line("milk", 1))
                        .await
                })
            })
            .collect();
        let mut placed = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                placed += 1;
            }
        }

        assert_eq!(placed, 6);
        assert_eq!(
            service.ledger().require_batch(batch).await.unwrap().remaining(),
            0
        );
        let customer = service.customers().get_by_id(customer).await.unwrap().unwrap();
        assert_eq!(customer.total_orders(), 6);
        assert_eq!(customer.total_spent(), Money::from_major(600));
    }

    #[tokio::test]
    async fn conflicts_are_retried_transparently() {
        let e = engine();
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;

        e.store.fail_next_commits(2).await;
        let order = e.order(customer, "milk", 2).await;

        assert_eq!(e.remaining(batch).await, 1);
        assert_eq!(order.version(), Version::first());
    }

    #[tokio::test]
    async fn exhausted_retries_write_nothing() {
        let e = engine();
        e.product("milk", "dairy").await;
        let batch = e.batch("A", "milk", date(2025, 12, 1), 3).await;
        let customer = e.customer().await;

        e.store.fail_next_commits(10).await;
        let result = e
            .service
            .create_order(CreateOrder::new(customer, address()).with_line("milk", 2))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict {
                operation: "create_order",
                attempts: 10
            })
        ));
        assert_eq!(e.remaining(batch).await, 3);
        assert_eq!(e.customer_totals(customer).await, (0, Money::zero()));
    }
}

#[tokio::test]
async fn batch_bounds_hold_across_a_lifecycle() {
    let e = engine();
    e.product("milk", "dairy").await;
    let a = e.batch("A", "milk", date(2025, 12, 1), 4).await;
    let b = e.batch("B", "milk", date(2026, 2, 1), 4).await;
    let customer = e.customer().await;

    let first = e.order(customer, "milk", 4).await.order_id().unwrap();
    let second = e.order(customer, "milk", 3).await.order_id().unwrap();
    e.service
        .update_order(
            UpdateOrder::new(first)
                .with_line(EditLine::from_batch("milk", a, 2))
                .with_line(EditLine::from_batch("milk", b, 1)),
        )
        .await
        .unwrap();
    e.service.cancel_order(second, None).await.unwrap();

    for id in [a, b] {
        let batch = e.service.ledger().require_batch(id).await.unwrap();
        assert!(batch.remaining() <= batch.quantity());
    }
    assert_eq!(e.remaining(a).await, 2);
    assert_eq!(e.remaining(b).await, 3);

    let stock = e.service.stock().usable_stock(&ProductId::new("milk")).await.unwrap();
    assert_eq!(stock.usable_stock, 5);
    assert_eq!(
        e.customer_totals(customer).await,
        (1, Money::from_major(300))
    );
}
