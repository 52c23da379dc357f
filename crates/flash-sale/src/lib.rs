//! Flash-sale support for the mall core.
//!
//! This crate provides:
//! - `FlashSaleManager`: create/list/get/update/delete of activities and their
//!   product lines, keeping the listing cache entries in step
//! - `FlashSaleWarmer`: copies line stock and per-buyer limits into the cache
//!   with a TTL tied to the activity window
//! - `FlashSalePurchaseService`: buys a flash-sale line under row locks and
//!   records the purchase against the buyer's limit

pub mod activity;
pub mod config;
pub mod error;
pub mod keys;
pub mod manager;
pub mod purchase;
pub mod ttl;
pub mod warmer;

pub use activity::{ActivityPatch, NewActivity, NewFlashSaleProduct};
pub use config::FlashSaleConfig;
pub use error::{FlashSaleError, Result};
pub use manager::FlashSaleManager;
pub use purchase::{FlashPurchase, FlashSalePurchaseService};
pub use ttl::compute_ttl;
pub use warmer::{FlashSaleWarmer, WarmupReport};
