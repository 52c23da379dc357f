use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::{ActivityId, BuyerId, FlashSaleProductId, OrderId, ProductId, SkuId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    FlashSaleActivity, FlashSaleProduct, FlashSalePurchase, LockedSku, Order, OrderItem, Product,
    Result, Sku, StoreError,
    store::{Store, Transaction, quantity_to_i32},
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Sku(SkuId),
    FlashSaleProduct(FlashSaleProductId),
    Activity(ActivityId),
}

type RowLocks = Arc<StdMutex<HashMap<RowKey, Arc<Mutex<()>>>>>;

/// A held row lock.
///
/// On release the row's mutex is dropped from the lock table unless another
/// transaction is already waiting on it, so the table only holds contended rows.
struct RowGuard {
    key: RowKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: RowLocks,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    skus: HashMap<SkuId, Sku>,
    orders: HashMap<OrderId, Order>,
    order_items: Vec<OrderItem>,
    /// Activity rows; `products` is always empty here.
    activities: HashMap<ActivityId, FlashSaleActivity>,
    flash_products: HashMap<FlashSaleProductId, FlashSaleProduct>,
    purchases: Vec<FlashSalePurchase>,
}

impl Tables {
    fn activity_with_products(&self, id: ActivityId) -> Option<FlashSaleActivity> {
        let mut activity = self.activities.get(&id)?.clone();
        let mut products: Vec<_> = self
            .flash_products
            .values()
            .filter(|p| p.activity_id == id)
            .cloned()
            .collect();
        products.sort_by_key(|p| p.sort);
        activity.products = products;
        Some(activity)
    }
}

/// In-memory store implementation for testing and local runs.
///
/// Row locks are per-row async mutexes, so concurrent transactions contend
/// exactly as they would on `SELECT ... FOR UPDATE`. Writes are staged in the
/// transaction and applied under one write lock at commit.
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: RowLocks,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            row_locks: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds how long a transaction waits for a row lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of committed order items.
    pub async fn order_item_count(&self) -> usize {
        self.tables.read().await.order_items.len()
    }

    /// Returns the number of committed flash-sale product lines.
    pub async fn flash_sale_product_count(&self) -> usize {
        self.tables.read().await.flash_products.len()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }

    async fn lock_row(&self, key: RowKey) -> Result<RowGuard> {
        let mutex = self
            .row_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();
        // Built before waiting so a timed-out waiter still cleans up its entry.
        let mut row = RowGuard {
            key,
            guard: None,
            locks: Arc::clone(&self.row_locks),
        };
        let guard = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(format!("{key:?}")))?;
        row.guard = Some(guard);
        Ok(row)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(InMemoryTransaction {
            store: self.clone(),
            held: HashMap::new(),
            sku_stock: HashMap::new(),
            flash_stock: HashMap::new(),
            writes: Vec::new(),
        })
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        self.tables
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn save_sku(&self, sku: &Sku) -> Result<()> {
        if sku.stock < 0 {
            return Err(StoreError::Conflict(format!(
                "stock of SKU {} cannot be negative",
                sku.id
            )));
        }
        // Admin edits wait for in-flight checkouts holding the row, as an upsert would.
        let _row = self.lock_row(RowKey::Sku(sku.id)).await?;
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(&sku.product_id) {
            return Err(StoreError::Conflict(format!(
                "product {} does not exist",
                sku.product_id
            )));
        }
        tables.skus.insert(sku.id, sku.clone());
        Ok(())
    }

    async fn find_sku(&self, id: SkuId) -> Result<Option<Sku>> {
        Ok(self.tables.read().await.skus.get(&id).cloned())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<(Order, Vec<OrderItem>)>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).map(|order| {
            let items = tables
                .order_items
                .iter()
                .filter(|item| item.order_id == id)
                .cloned()
                .collect();
            (order.clone(), items)
        }))
    }

    async fn list_activities(&self) -> Result<Vec<FlashSaleActivity>> {
        let tables = self.tables.read().await;
        let mut activities: Vec<_> = tables
            .activities
            .keys()
            .filter_map(|id| tables.activity_with_products(*id))
            .collect();
        activities.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(activities)
    }

    async fn find_activity(&self, id: ActivityId) -> Result<Option<FlashSaleActivity>> {
        Ok(self.tables.read().await.activity_with_products(id))
    }
}

#[derive(Debug)]
enum Write {
    Order(Order),
    OrderItems(Vec<OrderItem>),
    InsertActivity(FlashSaleActivity),
    InsertFlashSaleProducts(Vec<FlashSaleProduct>),
    UpdateActivity(FlashSaleActivity),
    DeleteFlashSaleProducts(ActivityId),
    DeleteActivity(ActivityId),
    Purchase(FlashSalePurchase),
}

/// Transaction over an [`InMemoryStore`].
///
/// Dropping the handle discards staged writes and releases held row locks.
pub struct InMemoryTransaction {
    store: InMemoryStore,
    held: HashMap<RowKey, RowGuard>,
    sku_stock: HashMap<SkuId, i32>,
    flash_stock: HashMap<FlashSaleProductId, i32>,
    writes: Vec<Write>,
}

impl InMemoryTransaction {
    async fn acquire(&mut self, key: RowKey) -> Result<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }

        let row = self.store.lock_row(key).await?;
        self.held.insert(key, row);
        Ok(())
    }

    fn require_activity_lock(&self, id: ActivityId) -> Result<()> {
        if self.held.contains_key(&RowKey::Activity(id)) {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!("activity {id} is not locked")))
        }
    }

    fn pending_delete(&self, id: ActivityId) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w, Write::DeleteActivity(deleted) if *deleted == id))
    }

    fn check_unique(&self, tables: &Tables) -> Result<()> {
        for write in &self.writes {
            if let Write::Order(order) = write
                && tables
                    .orders
                    .values()
                    .any(|existing| existing.order_no == order.order_no)
            {
                return Err(StoreError::UniqueViolation {
                    constraint: "orders_order_no_key".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn lock_sku(&mut self, id: SkuId) -> Result<Option<LockedSku>> {
        self.acquire(RowKey::Sku(id)).await?;

        let tables = self.store.tables.read().await;
        let Some(mut sku) = tables.skus.get(&id).cloned() else {
            return Ok(None);
        };
        if let Some(stock) = self.sku_stock.get(&id) {
            sku.stock = *stock;
        }
        let product = tables.products.get(&sku.product_id);

        Ok(Some(LockedSku {
            product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
            product_image: product.and_then(|p| p.main_image.clone()),
            sku,
        }))
    }

    async fn decrement_sku_stock(&mut self, id: SkuId, quantity: u32) -> Result<()> {
        if !self.held.contains_key(&RowKey::Sku(id)) {
            return Err(StoreError::Conflict(format!("SKU {id} is not locked")));
        }
        let quantity = quantity_to_i32(quantity)?;
        let current = match self.sku_stock.get(&id) {
            Some(stock) => *stock,
            None => self
                .store
                .tables
                .read()
                .await
                .skus
                .get(&id)
                .map(|s| s.stock)
                .ok_or_else(|| StoreError::Conflict(format!("SKU {id} does not exist")))?,
        };
        if current < quantity {
            return Err(StoreError::Conflict(format!(
                "stock of SKU {id} would go negative"
            )));
        }
        self.sku_stock.insert(id, current - quantity);
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.writes.push(Write::Order(order.clone()));
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        self.writes.push(Write::OrderItems(items.to_vec()));
        Ok(())
    }

    async fn find_activity(&mut self, id: ActivityId) -> Result<Option<FlashSaleActivity>> {
        self.store.find_activity(id).await
    }

    async fn insert_activity(&mut self, activity: &FlashSaleActivity) -> Result<()> {
        self.writes.push(Write::InsertActivity(FlashSaleActivity {
            products: Vec::new(),
            ..activity.clone()
        }));
        Ok(())
    }

    async fn insert_flash_sale_products(&mut self, products: &[FlashSaleProduct]) -> Result<()> {
        self.writes
            .push(Write::InsertFlashSaleProducts(products.to_vec()));
        Ok(())
    }

    async fn lock_activity(&mut self, id: ActivityId) -> Result<Option<FlashSaleActivity>> {
        self.acquire(RowKey::Activity(id)).await?;
        if self.pending_delete(id) {
            return Ok(None);
        }
        Ok(self.store.tables.read().await.activity_with_products(id))
    }

    async fn update_activity(&mut self, activity: &FlashSaleActivity) -> Result<bool> {
        self.require_activity_lock(activity.id)?;
        let exists = self
            .store
            .tables
            .read()
            .await
            .activities
            .contains_key(&activity.id);
        if !exists || self.pending_delete(activity.id) {
            return Ok(false);
        }
        self.writes.push(Write::UpdateActivity(FlashSaleActivity {
            products: Vec::new(),
            ..activity.clone()
        }));
        Ok(true)
    }

    async fn delete_flash_sale_products(&mut self, activity_id: ActivityId) -> Result<u64> {
        let mut line_ids: Vec<FlashSaleProductId> = self
            .store
            .tables
            .read()
            .await
            .flash_products
            .values()
            .filter(|p| p.activity_id == activity_id)
            .map(|p| p.id)
            .collect();
        line_ids.sort();

        // Deleting a row blocks concurrent lockers of that row, as in PostgreSQL.
        for id in &line_ids {
            self.acquire(RowKey::FlashSaleProduct(*id)).await?;
        }

        self.writes
            .push(Write::DeleteFlashSaleProducts(activity_id));
        Ok(line_ids.len() as u64)
    }

    async fn delete_activity(&mut self, id: ActivityId) -> Result<bool> {
        self.require_activity_lock(id)?;
        let exists = self.store.tables.read().await.activities.contains_key(&id);
        if !exists || self.pending_delete(id) {
            return Ok(false);
        }
        self.writes.push(Write::DeleteActivity(id));
        Ok(true)
    }

    async fn lock_flash_sale_product(
        &mut self,
        activity_id: ActivityId,
        sku_id: SkuId,
    ) -> Result<Option<FlashSaleProduct>> {
        let line_id = self
            .store
            .tables
            .read()
            .await
            .flash_products
            .values()
            .find(|p| p.activity_id == activity_id && p.sku_id == sku_id)
            .map(|p| p.id);
        let Some(line_id) = line_id else {
            return Ok(None);
        };

        self.acquire(RowKey::FlashSaleProduct(line_id)).await?;

        // Re-read under the lock: the line may have been deleted while we waited.
        let mut line = match self.store.tables.read().await.flash_products.get(&line_id) {
            Some(line) => line.clone(),
            None => return Ok(None),
        };
        if let Some(stock) = self.flash_stock.get(&line_id) {
            line.stock = *stock;
        }
        Ok(Some(line))
    }

    async fn decrement_flash_sale_stock(
        &mut self,
        id: FlashSaleProductId,
        quantity: u32,
    ) -> Result<()> {
        if !self.held.contains_key(&RowKey::FlashSaleProduct(id)) {
            return Err(StoreError::Conflict(format!(
                "flash-sale line {id} is not locked"
            )));
        }
        let quantity = quantity_to_i32(quantity)?;
        let current = match self.flash_stock.get(&id) {
            Some(stock) => *stock,
            None => self
                .store
                .tables
                .read()
                .await
                .flash_products
                .get(&id)
                .map(|p| p.stock)
                .ok_or_else(|| {
                    StoreError::Conflict(format!("flash-sale line {id} does not exist"))
                })?,
        };
        if current < quantity {
            return Err(StoreError::Conflict(format!(
                "stock of flash-sale line {id} would go negative"
            )));
        }
        self.flash_stock.insert(id, current - quantity);
        Ok(())
    }

    async fn purchased_quantity(
        &mut self,
        activity_id: ActivityId,
        sku_id: SkuId,
        buyer_id: BuyerId,
    ) -> Result<u32> {
        let matches = |p: &FlashSalePurchase| {
            p.activity_id == activity_id && p.sku_id == sku_id && p.buyer_id == buyer_id
        };
        let committed: u32 = self
            .store
            .tables
            .read()
            .await
            .purchases
            .iter()
            .filter(|p| matches(p))
            .map(|p| p.quantity)
            .sum();
        let staged: u32 = self
            .writes
            .iter()
            .filter_map(|w| match w {
                Write::Purchase(p) if matches(p) => Some(p.quantity),
                _ => None,
            })
            .sum();
        Ok(committed + staged)
    }

    async fn insert_flash_sale_purchase(&mut self, purchase: &FlashSalePurchase) -> Result<()> {
        self.writes.push(Write::Purchase(purchase.clone()));
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let mut tables = self.store.tables.write().await;
        self.check_unique(&tables)?;

        for (id, stock) in &self.sku_stock {
            if let Some(sku) = tables.skus.get_mut(id) {
                sku.stock = *stock;
            }
        }
        for (id, stock) in &self.flash_stock {
            if let Some(line) = tables.flash_products.get_mut(id) {
                line.stock = *stock;
            }
        }

        for write in self.writes {
            match write {
                Write::Order(order) => {
                    tables.orders.insert(order.id, order);
                }
                Write::OrderItems(items) => tables.order_items.extend(items),
                Write::InsertActivity(activity) => {
                    tables.activities.insert(activity.id, activity);
                }
                Write::UpdateActivity(activity) => {
                    if let Some(row) = tables.activities.get_mut(&activity.id) {
                        *row = activity;
                    }
                }
                Write::InsertFlashSaleProducts(products) => {
                    for product in products {
                        tables.flash_products.insert(product.id, product);
                    }
                }
                Write::DeleteFlashSaleProducts(activity_id) => {
                    tables
                        .flash_products
                        .retain(|_, p| p.activity_id != activity_id);
                }
                Write::DeleteActivity(id) => {
                    tables.activities.remove(&id);
                }
                Write::Purchase(purchase) => tables.purchases.push(purchase),
            }
        }

        // Row locks are released when `self.held` drops after the tables lock.
        drop(tables);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
