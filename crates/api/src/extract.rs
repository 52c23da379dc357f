//! Caller identity taken from request headers.
//!
//! Authentication happens upstream; these headers carry its result.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::BuyerId;

use crate::error::ApiError;

pub const BUYER_HEADER: &str = "x-buyer-id";
pub const ADMIN_HEADER: &str = "x-admin-id";

/// The authenticated buyer. Required.
#[derive(Debug, Clone, Copy)]
pub struct Buyer(pub BuyerId);

impl<S: Send + Sync> FromRequestParts<S> for Buyer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(BUYER_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing {BUYER_HEADER} header")))?;
        let id = value
            .to_str()
            .ok()
            .and_then(|v| BuyerId::parse(v.trim()).ok())
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid {BUYER_HEADER} header")))?;
        Ok(Buyer(id))
    }
}

/// The admin performing a change, if known. Recorded in the audit trail.
#[derive(Debug, Clone, Default)]
pub struct Admin(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for Admin {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Admin(
            parts
                .headers
                .get(ADMIN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        ))
    }
}
