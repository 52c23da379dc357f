//! Cache warmer: copies flash-sale stock and limits into the cache.

use std::time::Duration;

use cache::Cache;
use chrono::Utc;
use common::ActivityId;
use store::Store;

use crate::keys::{limit_key, stock_key};
use crate::{FlashSaleConfig, FlashSaleError, Result, compute_ttl};

/// Outcome of one warmup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupReport {
    pub activity_id: ActivityId,
    pub keys_written: usize,
    pub ttl: Duration,
}

/// Pre-populates the cache with an activity's line stock and per-buyer limits.
///
/// Entries are overwritten, never incremented, so repeating a warmup leaves
/// the cache in the same state.
pub struct FlashSaleWarmer<S: Store, C: Cache> {
    store: S,
    cache: C,
    config: FlashSaleConfig,
}

impl<S: Store, C: Cache> FlashSaleWarmer<S, C> {
    /// Creates a new warmer.
    pub fn new(store: S, cache: C, config: FlashSaleConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Writes `flash_sale:stock:<sku>` and `flash_sale:limit:<sku>` for every line.
    #[tracing::instrument(skip(self))]
    pub async fn warmup(&self, activity_id: ActivityId) -> Result<WarmupReport> {
        let activity = self
            .store
            .find_activity(activity_id)
            .await?
            .ok_or(FlashSaleError::ActivityNotFound(activity_id))?;

        let ttl = compute_ttl(
            activity.end_time,
            Utc::now(),
            self.config.grace,
            self.config.fallback_ttl,
        );

        let entries: Vec<(String, String)> = activity
            .products
            .iter()
            .flat_map(|line| {
                [
                    (stock_key(line.sku_id), line.stock.to_string()),
                    (limit_key(line.sku_id), line.limit_per_user.to_string()),
                ]
            })
            .collect();

        self.cache.set_many_ex(&entries, ttl).await?;

        metrics::counter!("flash_sale_warmups_total").increment(1);
        tracing::info!(
            %activity_id,
            keys = entries.len(),
            ttl_secs = ttl.as_secs(),
            "flash-sale cache warmed"
        );

        Ok(WarmupReport {
            activity_id,
            keys_written: entries.len(),
            ttl,
        })
    }
}
