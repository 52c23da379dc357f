use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    ActivityId, BuyerId, FlashSaleProductId, Money, OrderId, OrderItemId, ProductId, SkuId,
};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    FlashSaleActivity, FlashSaleProduct, FlashSalePurchase, LockedSku, Order, OrderItem, Product,
    ReceiverInfo, Result, Sku, StoreError,
    store::{Store, Transaction, quantity_to_i32},
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const ACTIVITY_COLUMNS: &str = "id, title, start_time, end_time, status";
const FLASH_PRODUCT_COLUMNS: &str =
    "id, activity_id, product_id, sku_id, flash_price_cents, stock, limit_per_user, sort_order";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bounds how long a transaction waits for a row lock (`SET LOCAL lock_timeout`).
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn row_to_sku(row: &PgRow) -> Result<Sku> {
    Ok(Sku {
        id: SkuId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        code: row.try_get("code")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: row.try_get("stock")?,
        specs: row.try_get("specs")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let receiver: serde_json::Value = row.try_get("receiver_info")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_no: row.try_get("order_no")?,
        buyer_id: BuyerId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        pay_amount: Money::from_cents(row.try_get("pay_amount_cents")?),
        status: status.parse().map_err(StoreError::Decode)?,
        receiver: serde_json::from_value::<ReceiverInfo>(receiver)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        sku_id: SkuId::from_uuid(row.try_get::<Uuid, _>("sku_id")?),
        product_name: row.try_get("product_name")?,
        product_image: row.try_get("product_image")?,
        specs: row.try_get("specs")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        quantity: decode_quantity(row.try_get("quantity")?)?,
    })
}

fn row_to_activity(row: &PgRow) -> Result<FlashSaleActivity> {
    let status: String = row.try_get("status")?;

    Ok(FlashSaleActivity {
        id: ActivityId::from_uuid(row.try_get::<Uuid, _>("id")?),
        title: row.try_get("title")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        status: status.parse().map_err(StoreError::Decode)?,
        products: Vec::new(),
    })
}

fn row_to_flash_product(row: &PgRow) -> Result<FlashSaleProduct> {
    Ok(FlashSaleProduct {
        id: FlashSaleProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        activity_id: ActivityId::from_uuid(row.try_get::<Uuid, _>("activity_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        sku_id: SkuId::from_uuid(row.try_get::<Uuid, _>("sku_id")?),
        flash_price: Money::from_cents(row.try_get("flash_price_cents")?),
        stock: row.try_get("stock")?,
        limit_per_user: decode_quantity(row.try_get("limit_per_user")?)?,
        sort: row.try_get("sort_order")?,
    })
}

fn decode_quantity(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("negative quantity {value}")))
}

async fn fetch_activity(
    conn: &mut sqlx::PgConnection,
    id: ActivityId,
    for_update: bool,
) -> Result<Option<FlashSaleActivity>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM flash_sale_activities WHERE id = $1{lock}"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut activity = row_to_activity(&row)?;

    let rows = sqlx::query(&format!(
        "SELECT {FLASH_PRODUCT_COLUMNS} FROM flash_sale_products WHERE activity_id = $1 ORDER BY sort_order ASC"
    ))
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;
    activity.products = rows
        .iter()
        .map(row_to_flash_product)
        .collect::<Result<_>>()?;

    Ok(Some(activity))
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let mut tx = self.pool.begin().await?;

        // SET does not accept bind parameters; the value is an integer we format ourselves.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(PostgresTransaction { tx })
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, main_image)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                main_image = EXCLUDED.main_image
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.main_image)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_sku(&self, sku: &Sku) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO skus (id, product_id, code, price_cents, stock, specs)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                product_id = EXCLUDED.product_id,
                code = EXCLUDED.code,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                specs = EXCLUDED.specs
            "#,
        )
        .bind(sku.id.as_uuid())
        .bind(sku.product_id.as_uuid())
        .bind(&sku.code)
        .bind(sku.price.cents())
        .bind(sku.stock)
        .bind(&sku.specs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_sku(&self, id: SkuId) -> Result<Option<Sku>> {
        let row = sqlx::query(
            "SELECT id, product_id, code, price_cents, stock, specs FROM skus WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_sku).transpose()
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<(Order, Vec<OrderItem>)>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_no, buyer_id, total_amount_cents, pay_amount_cents, status,
                   receiver_info, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order = row_to_order(&row)?;

        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, sku_id, product_name, product_image, specs,
                   price_cents, quantity
            FROM order_items
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        let items = rows
            .iter()
            .map(row_to_order_item)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some((order, items)))
    }

    async fn list_activities(&self) -> Result<Vec<FlashSaleActivity>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM flash_sale_activities ORDER BY start_time DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        let mut activities = rows
            .iter()
            .map(row_to_activity)
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<Uuid> = activities.iter().map(|a| a.id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {FLASH_PRODUCT_COLUMNS} FROM flash_sale_products WHERE activity_id = ANY($1) ORDER BY sort_order ASC"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_activity: HashMap<ActivityId, Vec<FlashSaleProduct>> = HashMap::new();
        for row in &rows {
            let line = row_to_flash_product(row)?;
            by_activity.entry(line.activity_id).or_default().push(line);
        }
        for activity in &mut activities {
            activity.products = by_activity.remove(&activity.id).unwrap_or_default();
        }

        Ok(activities)
    }

    async fn find_activity(&self, id: ActivityId) -> Result<Option<FlashSaleActivity>> {
        let mut conn = self.pool.acquire().await?;
        fetch_activity(&mut conn, id, false).await
    }
}

/// Transaction over a [`PostgresStore`].
///
/// Wraps a `sqlx` transaction, which rolls back when dropped without commit.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn lock_sku(&mut self, id: SkuId) -> Result<Option<LockedSku>> {
        let row = sqlx::query(
            r#"
            SELECT s.id, s.product_id, s.code, s.price_cents, s.stock, s.specs,
                   p.name AS product_name, p.main_image AS product_image
            FROM skus s
            JOIN products p ON p.id = s.product_id
            WHERE s.id = $1
            FOR UPDATE OF s
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(LockedSku {
            sku: row_to_sku(&row)?,
            product_name: row.try_get("product_name")?,
            product_image: row.try_get("product_image")?,
        }))
    }

    async fn decrement_sku_stock(&mut self, id: SkuId, quantity: u32) -> Result<()> {
        let quantity = quantity_to_i32(quantity)?;
        let result = sqlx::query("UPDATE skus SET stock = stock - $2 WHERE id = $1 AND stock >= $2")
            .bind(id.as_uuid())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "stock of SKU {id} would go negative"
            )));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let receiver = serde_json::to_value(&order.receiver)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_no, buyer_id, total_amount_cents, pay_amount_cents,
                                status, receiver_info, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_no)
        .bind(order.buyer_id.as_uuid())
        .bind(order.total_amount.cents())
        .bind(order.pay_amount.cents())
        .bind(order.status.as_str())
        .bind(receiver)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        for (line_no, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, line_no, product_id, sku_id, product_name,
                                         product_image, specs, price_cents, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(line_no as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.sku_id.as_uuid())
            .bind(&item.product_name)
            .bind(&item.product_image)
            .bind(&item.specs)
            .bind(item.price.cents())
            .bind(quantity_to_i32(item.quantity)?)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn find_activity(&mut self, id: ActivityId) -> Result<Option<FlashSaleActivity>> {
        fetch_activity(&mut *self.tx, id, false).await
    }

    async fn lock_activity(&mut self, id: ActivityId) -> Result<Option<FlashSaleActivity>> {
        fetch_activity(&mut *self.tx, id, true).await
    }

    async fn insert_activity(&mut self, activity: &FlashSaleActivity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flash_sale_activities (id, title, start_time, end_time, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(activity.id.as_uuid())
        .bind(&activity.title)
        .bind(activity.start_time)
        .bind(activity.end_time)
        .bind(activity.status.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_flash_sale_products(&mut self, products: &[FlashSaleProduct]) -> Result<()> {
        for line in products {
            sqlx::query(&format!(
                "INSERT INTO flash_sale_products ({FLASH_PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(line.id.as_uuid())
            .bind(line.activity_id.as_uuid())
            .bind(line.product_id.as_uuid())
            .bind(line.sku_id.as_uuid())
            .bind(line.flash_price.cents())
            .bind(line.stock)
            .bind(quantity_to_i32(line.limit_per_user)?)
            .bind(line.sort)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn update_activity(&mut self, activity: &FlashSaleActivity) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE flash_sale_activities
            SET title = $2, start_time = $3, end_time = $4, status = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(activity.id.as_uuid())
        .bind(&activity.title)
        .bind(activity.start_time)
        .bind(activity.end_time)
        .bind(activity.status.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_flash_sale_products(&mut self, activity_id: ActivityId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM flash_sale_products WHERE activity_id = $1")
            .bind(activity_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_activity(&mut self, id: ActivityId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flash_sale_activities WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn lock_flash_sale_product(
        &mut self,
        activity_id: ActivityId,
        sku_id: SkuId,
    ) -> Result<Option<FlashSaleProduct>> {
        let row = sqlx::query(&format!(
            "SELECT {FLASH_PRODUCT_COLUMNS} FROM flash_sale_products WHERE activity_id = $1 AND sku_id = $2 FOR UPDATE"
        ))
        .bind(activity_id.as_uuid())
        .bind(sku_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_flash_product).transpose()
    }

    async fn decrement_flash_sale_stock(
        &mut self,
        id: FlashSaleProductId,
        quantity: u32,
    ) -> Result<()> {
        let quantity = quantity_to_i32(quantity)?;
        let result = sqlx::query(
            "UPDATE flash_sale_products SET stock = stock - $2 WHERE id = $1 AND stock >= $2",
        )
        .bind(id.as_uuid())
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "stock of flash-sale line {id} would go negative"
            )));
        }
        Ok(())
    }

    async fn purchased_quantity(
        &mut self,
        activity_id: ActivityId,
        sku_id: SkuId,
        buyer_id: BuyerId,
    ) -> Result<u32> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM flash_sale_purchases
            WHERE activity_id = $1 AND sku_id = $2 AND buyer_id = $3
            "#,
        )
        .bind(activity_id.as_uuid())
        .bind(sku_id.as_uuid())
        .bind(buyer_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;

        u32::try_from(total).map_err(|_| StoreError::Decode(format!("purchase total {total}")))
    }

    async fn insert_flash_sale_purchase(&mut self, purchase: &FlashSalePurchase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flash_sale_purchases (activity_id, sku_id, buyer_id, order_id, quantity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(purchase.activity_id.as_uuid())
        .bind(purchase.sku_id.as_uuid())
        .bind(purchase.buyer_id.as_uuid())
        .bind(purchase.order_id.as_uuid())
        .bind(quantity_to_i32(purchase.quantity)?)
        .bind(purchase.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
