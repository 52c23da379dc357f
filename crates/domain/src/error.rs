//! Order placement error types.

use common::{OrderId, SkuId};
use store::StoreError;
use thiserror::Error;

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

/// Errors that can occur while placing or reading orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request is malformed. Nothing was touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A requested SKU doesn't exist.
    #[error("SKU not found: {0}")]
    SkuNotFound(SkuId),

    /// A SKU has less stock than requested.
    #[error("Insufficient stock for SKU {sku_id}: requested {requested}, available {available}")]
    InsufficientStock {
        sku_id: SkuId,
        requested: u32,
        available: i32,
    },

    /// The order doesn't exist.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The transaction failed. Retryable failures were already retried.
    #[error("Transaction failed: {0}")]
    Transaction(#[from] StoreError),
}

impl OrderError {
    /// Returns true if the failure is transient and the request may be resent as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::Transaction(e) if e.is_retryable())
    }

    /// Short label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::SkuNotFound(_) => "sku_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::NotFound(_) => "not_found",
            OrderError::Transaction(e) if e.is_retryable() => "contention",
            OrderError::Transaction(_) => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_for_transient_store_failures() {
        assert!(OrderError::Transaction(StoreError::Deadlock("x".into())).is_retryable());
        assert!(!OrderError::Transaction(StoreError::Conflict("x".into())).is_retryable());
        assert!(!OrderError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn insufficient_stock_message_names_quantities() {
        let sku_id = SkuId::new();
        let err = OrderError::InsufficientStock {
            sku_id,
            requested: 3,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            format!("Insufficient stock for SKU {sku_id}: requested 3, available 2")
        );
        assert_eq!(err.reason(), "insufficient_stock");
    }
}
