//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use flash_sale::FlashSaleError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order placement error.
    Order(OrderError),
    /// Flash-sale error.
    FlashSale(FlashSaleError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::FlashSale(err) => flash_sale_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn order_error_to_response(err: OrderError) -> (StatusCode, String) {
    let status = match &err {
        OrderError::Validation(_) => StatusCode::BAD_REQUEST,
        OrderError::SkuNotFound(_) | OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InsufficientStock { .. } => StatusCode::CONFLICT,
        OrderError::Transaction(e) => store_error_status(e),
    };
    (status, err.to_string())
}

fn flash_sale_error_to_response(err: FlashSaleError) -> (StatusCode, String) {
    let status = match &err {
        FlashSaleError::Validation(_) => StatusCode::BAD_REQUEST,
        FlashSaleError::ActivityNotFound(_)
        | FlashSaleError::SkuNotFound(_)
        | FlashSaleError::LineNotFound { .. } => StatusCode::NOT_FOUND,
        FlashSaleError::InsufficientStock { .. } => StatusCode::CONFLICT,
        FlashSaleError::LimitExceeded { .. } | FlashSaleError::NotActive(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FlashSaleError::Store(e) => store_error_status(e),
        FlashSaleError::Cache(_) | FlashSaleError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn store_error_status(err: &StoreError) -> StatusCode {
    if err.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<FlashSaleError> for ApiError {
    fn from(err: FlashSaleError) -> Self {
        ApiError::FlashSale(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{ActivityId, SkuId};

    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn client_errors() {
        assert_eq!(
            status_of(OrderError::Validation("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                OrderError::InsufficientStock {
                    sku_id: SkuId::new(),
                    requested: 2,
                    available: 1
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FlashSaleError::NotActive(ActivityId::new()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(FlashSaleError::ActivityNotFound(ActivityId::new()).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn transaction_failures() {
        assert_eq!(
            status_of(OrderError::Transaction(StoreError::Deadlock("x".into())).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(OrderError::Transaction(StoreError::Connection("down".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn backend_failures_are_server_errors() {
        let cache_err = cache::CacheError::InvalidTtl(std::time::Duration::ZERO);
        assert_eq!(
            status_of(FlashSaleError::Cache(cache_err).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
