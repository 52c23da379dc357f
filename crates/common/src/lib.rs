//! Shared identifier and money types used across the mall crates.

mod money;
mod types;

pub use money::Money;
pub use types::{
    ActivityId, BuyerId, FlashSaleProductId, OrderId, OrderItemId, ProductId, SkuId,
};
