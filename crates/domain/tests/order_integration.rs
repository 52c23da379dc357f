//! Integration tests for order placement.
//!
//! These run against the in-memory store, whose row locks contend the same
//! way `SELECT ... FOR UPDATE` does.

use std::sync::Arc;
use std::time::Duration;

use common::{BuyerId, Money, ProductId, SkuId};
use domain::{CheckoutConfig, OrderError, OrderLine, OrderService, PlaceOrder};
use store::{InMemoryStore, Product, ReceiverInfo, Sku, Store, StoreError, Transaction};

async fn seed_sku(store: &InMemoryStore, name: &str, price: i64, stock: i32) -> SkuId {
    let product = Product {
        id: ProductId::new(),
        name: name.to_string(),
        main_image: Some(format!("{}.png", name.to_lowercase())),
    };
    store.save_product(&product).await.unwrap();

    let sku = Sku {
        id: SkuId::new(),
        product_id: product.id,
        code: format!("{}-STD", name.to_uppercase()),
        price: Money::from_cents(price),
        stock,
        specs: serde_json::json!({"edition": "standard"}),
    };
    store.save_sku(&sku).await.unwrap();
    sku.id
}

fn receiver() -> ReceiverInfo {
    ReceiverInfo {
        name: "Ada Lovelace".to_string(),
        phone: "555-0100".to_string(),
        address: "12 Analytical Row".to_string(),
    }
}

fn order(lines: Vec<OrderLine>) -> PlaceOrder {
    PlaceOrder::new(BuyerId::new(), lines, receiver())
}

async fn stock_of(store: &InMemoryStore, id: SkuId) -> i32 {
    store.find_sku(id).await.unwrap().unwrap().stock
}

mod placement {
    use super::*;

    #[tokio::test]
    async fn order_deducts_stock_and_snapshots_lines() {
        let store = InMemoryStore::new();
        let lamp = seed_sku(&store, "Lamp", 2500, 10).await;
        let bulb = seed_sku(&store, "Bulb", 300, 10).await;
        let service = OrderService::new(store.clone());

        let placed = service
            .place_order(order(vec![
                OrderLine::new(lamp, 1),
                OrderLine::new(bulb, 4),
            ]))
            .await
            .unwrap();

        assert_eq!(placed.order.total_amount, Money::from_cents(3700));
        assert_eq!(placed.order.pay_amount, Money::from_cents(3700));
        assert_eq!(placed.items.len(), 2);
        assert_eq!(stock_of(&store, lamp).await, 9);
        assert_eq!(stock_of(&store, bulb).await, 6);

        let read_back = service.get_order(placed.order.id).await.unwrap();
        assert_eq!(read_back.order, placed.order);
        assert_eq!(read_back.items.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_lines_deduct_once_per_unit() {
        let store = InMemoryStore::new();
        let pen = seed_sku(&store, "Pen", 150, 5).await;
        let service = OrderService::new(store.clone());

        let placed = service
            .place_order(order(vec![OrderLine::new(pen, 2), OrderLine::new(pen, 3)]))
            .await
            .unwrap();

        assert_eq!(placed.items.len(), 1);
        assert_eq!(placed.items[0].quantity, 5);
        assert_eq!(stock_of(&store, pen).await, 0);
    }

    #[tokio::test]
    async fn snapshot_survives_catalog_edits() {
        let store = InMemoryStore::new();
        let cup = seed_sku(&store, "Cup", 800, 3).await;
        let service = OrderService::new(store.clone());

        let placed = service
            .place_order(order(vec![OrderLine::new(cup, 1)]))
            .await
            .unwrap();

        let mut sku = store.find_sku(cup).await.unwrap().unwrap();
        sku.price = Money::from_cents(9900);
        store.save_sku(&sku).await.unwrap();

        let read_back = service.get_order(placed.order.id).await.unwrap();
        assert_eq!(read_back.items[0].price, Money::from_cents(800));
        assert_eq!(read_back.items[0].product_name, "Cup");
    }

    #[tokio::test]
    async fn order_numbers_are_unique() {
        let store = InMemoryStore::new();
        let pen = seed_sku(&store, "Pen", 100, 50).await;
        let service = OrderService::new(store.clone());

        let mut numbers = std::collections::HashSet::new();
        for _ in 0..20 {
            let placed = service
                .place_order(order(vec![OrderLine::new(pen, 1)]))
                .await
                .unwrap();
            assert!(numbers.insert(placed.order.order_no));
        }
    }
}

mod atomicity {
    use super::*;

    #[tokio::test]
    async fn insufficient_second_line_rolls_back_first() {
        let store = InMemoryStore::new();
        let plenty = seed_sku(&store, "Chair", 4000, 10).await;
        let scarce = seed_sku(&store, "Table", 12000, 1).await;
        let service = OrderService::new(store.clone());

        let err = service
            .place_order(order(vec![
                OrderLine::new(plenty, 2),
                OrderLine::new(scarce, 2),
            ]))
            .await
            .unwrap_err();

        match err {
            OrderError::InsufficientStock {
                sku_id,
                requested,
                available,
            } => {
                assert_eq!(sku_id, scarce);
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(stock_of(&store, plenty).await, 10);
        assert_eq!(stock_of(&store, scarce).await, 1);
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.order_item_count().await, 0);
    }

    #[tokio::test]
    async fn overflowing_total_is_rejected_without_deducting() {
        let store = InMemoryStore::new();
        let yacht = seed_sku(&store, "Yacht", 4_000_000_000_000_000_000, 10).await;
        let service = OrderService::new(store.clone());

        let err = service
            .place_order(order(vec![OrderLine::new(yacht, 3)]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Validation(_)));
        assert_eq!(stock_of(&store, yacht).await, 10);
        assert_eq!(store.order_count().await, 0);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_buyers_race_for_the_last_units() {
        let store = InMemoryStore::new();
        let sku = seed_sku(&store, "Console", 30000, 5).await;
        let service = Arc::new(OrderService::new(store.clone()));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .place_order(order(vec![OrderLine::new(sku, 3)]))
                        .await
                })
            })
            .collect();

        let results: Vec<_> = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(OrderError::InsufficientStock { .. })))
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(short, 1);
        assert_eq!(stock_of(&store, sku).await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn stock_never_oversells() {
        let store = InMemoryStore::new();
        let sku = seed_sku(&store, "Ticket", 5000, 10).await;
        let service = Arc::new(OrderService::new(store.clone()));

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .place_order(order(vec![OrderLine::new(sku, 1)]))
                        .await
                })
            })
            .collect();

        let succeeded = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();

        assert_eq!(succeeded, 10);
        assert_eq!(stock_of(&store, sku).await, 0);
        assert_eq!(store.order_count().await, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn opposite_line_orders_do_not_deadlock() {
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_secs(2));
        let a = seed_sku(&store, "Fork", 100, 100).await;
        let b = seed_sku(&store, "Knife", 100, 100).await;
        let service = Arc::new(OrderService::new(store.clone()));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let service = Arc::clone(&service);
                let lines = if i % 2 == 0 {
                    vec![OrderLine::new(a, 1), OrderLine::new(b, 1)]
                } else {
                    vec![OrderLine::new(b, 1), OrderLine::new(a, 1)]
                };
                tokio::spawn(async move { service.place_order(order(lines)).await })
            })
            .collect();

        for result in futures_util::future::join_all(handles).await {
            result.unwrap().unwrap();
        }
        assert_eq!(stock_of(&store, a).await, 80);
        assert_eq!(stock_of(&store, b).await, 80);
    }
}

mod retries {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lock_timeout_is_retried_until_the_holder_releases() {
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(100));
        let sku = seed_sku(&store, "Kettle", 4500, 3).await;
        let service = OrderService::with_config(
            store.clone(),
            CheckoutConfig {
                lock_timeout: Duration::from_millis(100),
                max_attempts: 5,
            },
        );

        let mut holder = store.begin().await.unwrap();
        holder.lock_sku(sku).await.unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            holder.rollback().await.unwrap();
        });

        let placed = service
            .place_order(order(vec![OrderLine::new(sku, 1)]))
            .await
            .unwrap();
        release.await.unwrap();

        assert_eq!(placed.items[0].quantity, 1);
        assert_eq!(stock_of(&store, sku).await, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_a_retryable_error() {
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(30));
        let sku = seed_sku(&store, "Toaster", 3000, 3).await;
        let service = OrderService::with_config(
            store.clone(),
            CheckoutConfig {
                lock_timeout: Duration::from_millis(30),
                max_attempts: 2,
            },
        );

        let mut holder = store.begin().await.unwrap();
        holder.lock_sku(sku).await.unwrap();

        let err = service
            .place_order(order(vec![OrderLine::new(sku, 1)]))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(matches!(
            err,
            OrderError::Transaction(StoreError::LockTimeout(_))
        ));
        drop(holder);
        assert_eq!(stock_of(&store, sku).await, 3);
    }
}
