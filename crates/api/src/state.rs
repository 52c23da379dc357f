//! Shared application state.

use std::sync::Arc;

use cache::Cache;
use domain::OrderService;
use flash_sale::{FlashSaleManager, FlashSalePurchaseService, FlashSaleWarmer};
use store::Store;

use crate::audit::AuditSink;
use crate::config::Config;

/// Services reachable from every handler.
pub struct AppState<S: Store, C: Cache> {
    pub order_service: OrderService<S>,
    pub flash_sales: FlashSaleManager<S, C>,
    pub warmer: FlashSaleWarmer<S, C>,
    pub flash_purchases: FlashSalePurchaseService<S>,
    pub audit: Arc<dyn AuditSink>,
}

/// Wires every service over one store and one cache.
pub fn create_state<S, C>(
    store: S,
    cache: C,
    config: &Config,
    audit: Arc<dyn AuditSink>,
) -> Arc<AppState<S, C>>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    Arc::new(AppState {
        order_service: OrderService::with_config(store.clone(), config.checkout),
        flash_sales: FlashSaleManager::new(store.clone(), cache.clone(), config.flash_sale),
        warmer: FlashSaleWarmer::new(store.clone(), cache, config.flash_sale),
        flash_purchases: FlashSalePurchaseService::new(store, config.checkout),
        audit,
    })
}
