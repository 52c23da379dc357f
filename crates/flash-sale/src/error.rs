//! Flash-sale error types.

use cache::CacheError;
use common::{ActivityId, SkuId};
use domain::OrderError;
use store::StoreError;
use thiserror::Error;

/// Result type for flash-sale operations.
pub type Result<T> = std::result::Result<T, FlashSaleError>;

/// Errors that can occur during flash-sale operations.
#[derive(Debug, Error)]
pub enum FlashSaleError {
    /// The request is malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Activity not found.
    #[error("Activity not found: {0}")]
    ActivityNotFound(ActivityId),

    /// A referenced SKU doesn't exist.
    #[error("SKU not found: {0}")]
    SkuNotFound(SkuId),

    /// The activity has no line for the SKU.
    #[error("SKU {sku_id} is not part of activity {activity_id}")]
    LineNotFound {
        activity_id: ActivityId,
        sku_id: SkuId,
    },

    /// The activity is disabled or outside its window.
    #[error("Activity {0} is not active")]
    NotActive(ActivityId),

    /// The purchase would take the buyer past the per-user limit.
    #[error(
        "Purchase limit exceeded for SKU {sku_id}: limit {limit}, already purchased {purchased}, requested {requested}"
    )]
    LimitExceeded {
        sku_id: SkuId,
        limit: u32,
        purchased: u32,
        requested: u32,
    },

    /// The flash line or the SKU has less stock than requested.
    #[error("Insufficient stock for SKU {sku_id}: requested {requested}, available {available}")]
    InsufficientStock {
        sku_id: SkuId,
        requested: u32,
        available: i32,
    },

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlashSaleError {
    /// Returns true if the failure is transient and the request may be resent as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlashSaleError::Store(e) if e.is_retryable())
    }

    /// Short label used for the `outcome` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            FlashSaleError::Validation(_) => "validation",
            FlashSaleError::ActivityNotFound(_)
            | FlashSaleError::SkuNotFound(_)
            | FlashSaleError::LineNotFound { .. } => "not_found",
            FlashSaleError::NotActive(_) => "not_active",
            FlashSaleError::LimitExceeded { .. } => "limit_exceeded",
            FlashSaleError::InsufficientStock { .. } => "insufficient_stock",
            FlashSaleError::Store(e) if e.is_retryable() => "contention",
            FlashSaleError::Store(_) => "store",
            FlashSaleError::Cache(_) => "cache",
            FlashSaleError::Serialization(_) => "serialization",
        }
    }
}

impl From<OrderError> for FlashSaleError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(msg) => FlashSaleError::Validation(msg),
            OrderError::SkuNotFound(id) => FlashSaleError::SkuNotFound(id),
            OrderError::InsufficientStock {
                sku_id,
                requested,
                available,
            } => FlashSaleError::InsufficientStock {
                sku_id,
                requested,
                available,
            },
            OrderError::Transaction(e) => FlashSaleError::Store(e),
            OrderError::NotFound(id) => {
                FlashSaleError::Store(StoreError::Conflict(format!("order {id} vanished")))
            }
        }
    }
}
