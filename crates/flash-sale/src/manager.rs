//! Activity manager: CRUD over activities and their lines, with cache-aside listings.

use cache::Cache;
use common::{ActivityId, FlashSaleProductId};
use serde::{Serialize, de::DeserializeOwned};
use store::{FlashSaleActivity, FlashSaleProduct, Store, Transaction};

use crate::keys::{ACTIVITY_LIST_KEY, activity_detail_key};
use crate::{ActivityPatch, FlashSaleConfig, FlashSaleError, NewActivity, Result};

/// Manages flash-sale activities.
///
/// An activity and its lines are written and deleted in one transaction.
/// List and detail reads go through the cache; every write invalidates the
/// entries it affects once the transaction has committed. Stock and limit
/// entries belong to the warmer and are never touched here.
pub struct FlashSaleManager<S: Store, C: Cache> {
    store: S,
    cache: C,
    config: FlashSaleConfig,
}

impl<S: Store, C: Cache> FlashSaleManager<S, C> {
    /// Creates a new manager.
    pub fn new(store: S, cache: C, config: FlashSaleConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Creates an activity and its product lines.
    #[tracing::instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create(&self, request: NewActivity) -> Result<FlashSaleActivity> {
        request.validate()?;

        let activity_id = ActivityId::new();
        let mut products = Vec::with_capacity(request.products.len());
        for line in &request.products {
            let sku = self
                .store
                .find_sku(line.sku_id)
                .await?
                .ok_or(FlashSaleError::SkuNotFound(line.sku_id))?;
            products.push(FlashSaleProduct {
                id: FlashSaleProductId::new(),
                activity_id,
                product_id: sku.product_id,
                sku_id: sku.id,
                flash_price: line.flash_price,
                stock: i32::try_from(line.stock).map_err(|_| {
                    FlashSaleError::Validation(format!("stock for SKU {} is too large", sku.id))
                })?,
                limit_per_user: line.limit_per_user,
                sort: line.sort,
            });
        }
        products.sort_by_key(|p| p.sort);

        let activity = FlashSaleActivity {
            id: activity_id,
            title: request.title,
            start_time: request.start_time,
            end_time: request.end_time,
            status: request.status,
            products,
        };

        let mut tx = self.store.begin().await?;
        let outcome = insert_in(&mut tx, &activity).await;
        store::complete(tx, outcome).await?;

        self.invalidate(vec![ACTIVITY_LIST_KEY.to_string()]).await;
        tracing::info!(
            activity_id = %activity.id,
            lines = activity.products.len(),
            "flash-sale activity created"
        );
        Ok(activity)
    }

    /// Lists every activity, newest start first.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<FlashSaleActivity>> {
        if let Some(activities) = self.cached(ACTIVITY_LIST_KEY).await {
            return Ok(activities);
        }
        let activities = self.store.list_activities().await?;
        self.fill(ACTIVITY_LIST_KEY, &activities).await;
        Ok(activities)
    }

    /// Gets one activity with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ActivityId) -> Result<FlashSaleActivity> {
        let key = activity_detail_key(id);
        if let Some(activity) = self.cached(&key).await {
            return Ok(activity);
        }
        let activity = self
            .store
            .find_activity(id)
            .await?
            .ok_or(FlashSaleError::ActivityNotFound(id))?;
        self.fill(&key, &activity).await;
        Ok(activity)
    }

    /// Patches an activity's title, window or status.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(&self, id: ActivityId, patch: ActivityPatch) -> Result<FlashSaleActivity> {
        let mut tx = self.store.begin().await?;
        let outcome = update_in(&mut tx, id, patch).await;
        let activity = store::complete(tx, outcome).await?;

        self.invalidate(vec![ACTIVITY_LIST_KEY.to_string(), activity_detail_key(id)])
            .await;
        tracing::info!(activity_id = %id, "flash-sale activity updated");
        Ok(activity)
    }

    /// Deletes an activity and all its lines.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ActivityId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome = delete_in(&mut tx, id).await;
        let lines = store::complete(tx, outcome).await?;

        self.invalidate(vec![ACTIVITY_LIST_KEY.to_string(), activity_detail_key(id)])
            .await;
        tracing::info!(activity_id = %id, lines, "flash-sale activity deleted");
        Ok(())
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, falling back to store");
                None
            }
        }
    }

    async fn fill<T: Serialize>(&self, key: &str, value: &T) {
        let result = match serde_json::to_string(value) {
            Ok(json) => self
                .cache
                .set_ex(key, &json, self.config.listing_ttl)
                .await
                .map_err(FlashSaleError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "cache fill failed");
        }
    }

    // The store is already committed here, so a failed delete only leaves a
    // stale entry that expires with the listing TTL.
    async fn invalidate(&self, keys: Vec<String>) {
        if let Err(e) = self.cache.del(&keys).await {
            tracing::warn!(?keys, error = %e, "cache invalidation failed");
        }
    }
}

async fn insert_in<Tx: Transaction>(tx: &mut Tx, activity: &FlashSaleActivity) -> Result<()> {
    tx.insert_activity(activity).await?;
    tx.insert_flash_sale_products(&activity.products).await?;
    Ok(())
}

async fn update_in<Tx: Transaction>(
    tx: &mut Tx,
    id: ActivityId,
    patch: ActivityPatch,
) -> Result<FlashSaleActivity> {
    // Locked so concurrent patches apply one after another to the latest row.
    let mut activity = tx
        .lock_activity(id)
        .await?
        .ok_or(FlashSaleError::ActivityNotFound(id))?;
    patch.apply(&mut activity)?;
    if !tx.update_activity(&activity).await? {
        return Err(FlashSaleError::ActivityNotFound(id));
    }
    Ok(activity)
}

async fn delete_in<Tx: Transaction>(tx: &mut Tx, id: ActivityId) -> Result<u64> {
    // Activity before lines: purchases lock lines and never the activity row.
    if tx.lock_activity(id).await?.is_none() {
        return Err(FlashSaleError::ActivityNotFound(id));
    }
    let lines = tx.delete_flash_sale_products(id).await?;
    if !tx.delete_activity(id).await? {
        return Err(FlashSaleError::ActivityNotFound(id));
    }
    Ok(lines)
}
