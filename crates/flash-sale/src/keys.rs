//! Cache key layout.

use common::{ActivityId, SkuId};

/// Key holding the serialized activity list.
pub const ACTIVITY_LIST_KEY: &str = "flash_sale:activities:list";

/// Key holding a SKU's warmed flash-sale stock.
pub fn stock_key(sku_id: SkuId) -> String {
    format!("flash_sale:stock:{sku_id}")
}

/// Key holding a SKU's per-buyer purchase limit.
pub fn limit_key(sku_id: SkuId) -> String {
    format!("flash_sale:limit:{sku_id}")
}

/// Key holding one serialized activity.
pub fn activity_detail_key(id: ActivityId) -> String {
    format!("flash_sale:activity:detail:{id}")
}
