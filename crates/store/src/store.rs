use async_trait::async_trait;
use common::{ActivityId, BuyerId, FlashSaleProductId, OrderId, SkuId};

use crate::{
    FlashSaleActivity, FlashSaleProduct, FlashSalePurchase, LockedSku, Order, OrderItem, Product,
    Result, Sku, StoreError,
};

/// Core trait for relational store implementations.
///
/// Reads outside a transaction see committed state only. Every mutation that
/// must be atomic with others goes through a [`Transaction`] obtained from
/// [`Store::begin`]. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction handle type.
    type Tx: Transaction;

    /// Opens a transaction.
    ///
    /// The returned handle rolls back when dropped without [`Transaction::commit`].
    async fn begin(&self) -> Result<Self::Tx>;

    /// Inserts or replaces a product.
    async fn save_product(&self, product: &Product) -> Result<()>;

    /// Inserts or replaces a SKU. This is the direct admin edit path.
    async fn save_sku(&self, sku: &Sku) -> Result<()>;

    /// Retrieves a SKU by id.
    async fn find_sku(&self, id: SkuId) -> Result<Option<Sku>>;

    /// Retrieves an order and its items.
    async fn find_order(&self, id: OrderId) -> Result<Option<(Order, Vec<OrderItem>)>>;

    /// Retrieves every activity with its product lines, newest start first.
    async fn list_activities(&self) -> Result<Vec<FlashSaleActivity>>;

    /// Retrieves an activity with its product lines.
    async fn find_activity(&self, id: ActivityId) -> Result<Option<FlashSaleActivity>>;
}

/// A transactional handle over the store.
///
/// Row locks acquired through `lock_*` are held until the handle commits,
/// rolls back, or is dropped.
#[async_trait]
pub trait Transaction: Send + Sized {
    /// Acquires an exclusive lock on the SKU row and reads it.
    ///
    /// Returns None if the SKU doesn't exist.
    async fn lock_sku(&mut self, id: SkuId) -> Result<Option<LockedSku>>;

    /// Decrements the stock of a SKU locked by this transaction.
    ///
    /// Fails with `Conflict` if the row isn't locked here or the stock would go negative.
    async fn decrement_sku_stock(&mut self, id: SkuId, quantity: u32) -> Result<()>;

    /// Inserts an order row.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Inserts order item rows.
    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()>;

    /// Reads an activity with its product lines without locking.
    async fn find_activity(&mut self, id: ActivityId) -> Result<Option<FlashSaleActivity>>;

    /// Inserts an activity row. Its `products` are ignored.
    async fn insert_activity(&mut self, activity: &FlashSaleActivity) -> Result<()>;

    /// Inserts flash-sale product lines.
    async fn insert_flash_sale_products(&mut self, products: &[FlashSaleProduct]) -> Result<()>;

    /// Acquires an exclusive lock on the activity row and reads it with its lines.
    ///
    /// Returns None if the activity doesn't exist.
    async fn lock_activity(&mut self, id: ActivityId) -> Result<Option<FlashSaleActivity>>;

    /// Overwrites the activity row's fields. Returns false if it doesn't exist.
    ///
    /// The row must be locked through [`Transaction::lock_activity`] first.
    async fn update_activity(&mut self, activity: &FlashSaleActivity) -> Result<bool>;

    /// Deletes every product line of an activity, returning how many were removed.
    async fn delete_flash_sale_products(&mut self, activity_id: ActivityId) -> Result<u64>;

    /// Deletes an activity row. Returns false if it doesn't exist.
    ///
    /// The row must be locked through [`Transaction::lock_activity`] first.
    async fn delete_activity(&mut self, id: ActivityId) -> Result<bool>;

    /// Acquires an exclusive lock on the activity's line for `sku_id` and reads it.
    async fn lock_flash_sale_product(
        &mut self,
        activity_id: ActivityId,
        sku_id: SkuId,
    ) -> Result<Option<FlashSaleProduct>>;

    /// Decrements the stock of a flash-sale line locked by this transaction.
    async fn decrement_flash_sale_stock(
        &mut self,
        id: FlashSaleProductId,
        quantity: u32,
    ) -> Result<()>;

    /// Sums the quantity a buyer has already purchased from an activity line.
    async fn purchased_quantity(
        &mut self,
        activity_id: ActivityId,
        sku_id: SkuId,
        buyer_id: BuyerId,
    ) -> Result<u32>;

    /// Appends a row to the flash-sale purchase ledger.
    async fn insert_flash_sale_purchase(&mut self, purchase: &FlashSalePurchase) -> Result<()>;

    /// Makes every write of this transaction durable and releases its locks.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this transaction and releases its locks.
    async fn rollback(self) -> Result<()>;
}

/// Finishes a transaction according to the outcome of the work done in it.
///
/// Commits on `Ok` and rolls back on `Err`. A rollback failure is logged and
/// the original error is returned; the handle is released either way.
pub async fn complete<Tx, T, E>(
    tx: Tx,
    outcome: std::result::Result<T, E>,
) -> std::result::Result<T, E>
where
    Tx: Transaction,
    E: From<StoreError>,
{
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

/// Converts a quantity into the store's integer column type.
pub(crate) fn quantity_to_i32(quantity: u32) -> Result<i32> {
    i32::try_from(quantity)
        .map_err(|_| StoreError::Conflict(format!("quantity {quantity} exceeds column range")))
}
