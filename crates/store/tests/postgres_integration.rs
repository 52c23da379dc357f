//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need Docker, so they are
//! ignored by default. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{
    ActivityId, BuyerId, FlashSaleProductId, Money, OrderId, OrderItemId, ProductId, SkuId,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    ActivityStatus, FlashSaleActivity, FlashSaleProduct, Order, OrderItem, OrderStatus,
    PostgresStore, Product, ReceiverInfo, Sku, Store, StoreError, Transaction,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_mall_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE flash_sale_purchases, flash_sale_products, flash_sale_activities, order_items, orders, skus, products",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool).with_lock_timeout(Duration::from_millis(500))
}

async fn seed_sku(store: &PostgresStore, stock: i32) -> Sku {
    let product = Product {
        id: ProductId::new(),
        name: "Linen Shirt".to_string(),
        main_image: Some("shirt.png".to_string()),
    };
    store.save_product(&product).await.unwrap();

    let sku = Sku {
        id: SkuId::new(),
        product_id: product.id,
        code: "SHIRT-M".to_string(),
        price: Money::from_cents(4200),
        stock,
        specs: serde_json::json!({"size": "M"}),
    };
    store.save_sku(&sku).await.unwrap();
    sku
}

fn order_for(sku: &Sku, quantity: u32) -> (Order, Vec<OrderItem>) {
    let order_id = OrderId::new();
    let item = OrderItem {
        id: OrderItemId::new(),
        order_id,
        product_id: sku.product_id,
        sku_id: sku.id,
        product_name: "Linen Shirt".to_string(),
        product_image: Some("shirt.png".to_string()),
        specs: sku.specs.clone(),
        price: sku.price,
        quantity,
    };
    let total = item.line_total().unwrap();
    let order = Order {
        id: order_id,
        order_no: format!("T{}", &order_id.as_uuid().simple().to_string()[..20]),
        buyer_id: BuyerId::new(),
        total_amount: total,
        pay_amount: total,
        status: OrderStatus::PendingPay,
        receiver: ReceiverInfo {
            name: "Grace".to_string(),
            phone: "555-0199".to_string(),
            address: "7 Harbor St".to_string(),
        },
        created_at: Utc::now(),
    };
    (order, vec![item])
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn committed_order_is_readable_with_items() {
    let store = get_test_store().await;
    let sku = seed_sku(&store, 10).await;
    let (order, items) = order_for(&sku, 3);

    let mut tx = store.begin().await.unwrap();
    let locked = tx.lock_sku(sku.id).await.unwrap().unwrap();
    assert_eq!(locked.product_name, "Linen Shirt");
    tx.decrement_sku_stock(sku.id, 3).await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_order_items(&items).await.unwrap();
    tx.commit().await.unwrap();

    let (stored, stored_items) = store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.order_no, order.order_no);
    assert_eq!(stored.receiver, order.receiver);
    assert_eq!(stored_items, items);
    assert_eq!(store.find_sku(sku.id).await.unwrap().unwrap().stock, 7);
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn dropped_transaction_rolls_back() {
    let store = get_test_store().await;
    let sku = seed_sku(&store, 10).await;
    let (order, _) = order_for(&sku, 4);

    {
        let mut tx = store.begin().await.unwrap();
        tx.lock_sku(sku.id).await.unwrap();
        tx.decrement_sku_stock(sku.id, 4).await.unwrap();
        tx.insert_order(&order).await.unwrap();
    }

    assert_eq!(store.find_sku(sku.id).await.unwrap().unwrap().stock, 10);
    assert!(store.find_order(order.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn row_lock_blocks_second_locker_until_timeout() {
    let store = get_test_store().await;
    let sku = seed_sku(&store, 1).await;

    let mut holder = store.begin().await.unwrap();
    holder.lock_sku(sku.id).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let err = waiter.lock_sku(sku.id).await.unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout(_)), "got {err:?}");

    holder.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn decrement_refuses_to_go_negative() {
    let store = get_test_store().await;
    let sku = seed_sku(&store, 2).await;

    let mut tx = store.begin().await.unwrap();
    tx.lock_sku(sku.id).await.unwrap();
    let err = tx.decrement_sku_stock(sku.id, 3).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn duplicate_order_number_is_a_unique_violation() {
    let store = get_test_store().await;
    let sku = seed_sku(&store, 5).await;
    let (first, _) = order_for(&sku, 1);
    let (mut second, _) = order_for(&sku, 1);
    second.order_no = first.order_no.clone();

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&first).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx.insert_order(&second).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, StoreError::UniqueViolation { .. }));
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn activity_and_lines_are_created_and_deleted_together() {
    let store = get_test_store().await;
    let sku = seed_sku(&store, 50).await;
    let now = Utc::now();
    let activity = FlashSaleActivity {
        id: ActivityId::new(),
        title: "Weekend".to_string(),
        start_time: now,
        end_time: now + chrono::Duration::hours(2),
        status: ActivityStatus::Enabled,
        products: vec![],
    };
    let line = FlashSaleProduct {
        id: FlashSaleProductId::new(),
        activity_id: activity.id,
        product_id: sku.product_id,
        sku_id: sku.id,
        flash_price: Money::from_cents(1999),
        stock: 20,
        limit_per_user: 2,
        sort: 0,
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_activity(&activity).await.unwrap();
    tx.insert_flash_sale_products(std::slice::from_ref(&line))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let found = store.find_activity(activity.id).await.unwrap().unwrap();
    assert_eq!(found.products, vec![line]);
    assert_eq!(store.list_activities().await.unwrap().len(), 1);

    let mut tx = store.begin().await.unwrap();
    let locked = tx.lock_activity(activity.id).await.unwrap().unwrap();
    assert_eq!(locked.products.len(), 1);

    // A concurrent editor can't lock the row while the delete is in flight.
    let mut editor = store.begin().await.unwrap();
    let err = editor.lock_activity(activity.id).await.unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout(_)));
    drop(editor);

    assert_eq!(tx.delete_flash_sale_products(activity.id).await.unwrap(), 1);
    assert!(tx.delete_activity(activity.id).await.unwrap());
    tx.commit().await.unwrap();

    assert!(store.find_activity(activity.id).await.unwrap().is_none());
}
