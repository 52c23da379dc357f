//! Flash-sale admin and purchase endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cache::Cache;
use chrono::{DateTime, Utc};
use common::{ActivityId, SkuId};
use flash_sale::{ActivityPatch, FlashPurchase, NewActivity, WarmupReport};
use serde::{Deserialize, Serialize};
use store::{FlashSaleActivity, Store};

use super::orders::{OrderResponse, ReceiverInfoBody};
use super::parse_id;
use crate::audit::AuditRecord;
use crate::error::ApiError;
use crate::extract::{Admin, Buyer};
use crate::state::AppState;

const RESOURCE: &str = "flash_sale_activity";

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub sku_id: SkuId,
    pub quantity: u32,
    pub receiver_info: ReceiverInfoBody,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub products: Vec<FlashSaleProductResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashSaleProductResponse {
    pub id: String,
    pub product_id: String,
    pub sku_id: String,
    pub flash_price: i64,
    pub stock: i32,
    pub limit_per_user: u32,
    pub sort: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupResponse {
    pub activity_id: String,
    pub keys_written: usize,
    pub ttl_seconds: u64,
}

impl From<FlashSaleActivity> for ActivityResponse {
    fn from(activity: FlashSaleActivity) -> Self {
        ActivityResponse {
            id: activity.id.to_string(),
            title: activity.title,
            start_time: activity.start_time,
            end_time: activity.end_time,
            status: activity.status.as_str().to_string(),
            products: activity
                .products
                .into_iter()
                .map(|line| FlashSaleProductResponse {
                    id: line.id.to_string(),
                    product_id: line.product_id.to_string(),
                    sku_id: line.sku_id.to_string(),
                    flash_price: line.flash_price.cents(),
                    stock: line.stock,
                    limit_per_user: line.limit_per_user,
                    sort: line.sort,
                })
                .collect(),
        }
    }
}

impl From<WarmupReport> for WarmupResponse {
    fn from(report: WarmupReport) -> Self {
        WarmupResponse {
            activity_id: report.activity_id.to_string(),
            keys_written: report.keys_written,
            ttl_seconds: report.ttl.as_secs(),
        }
    }
}

// -- Admin handlers --

/// POST /mall/flash-sale: create an activity with its product lines.
#[tracing::instrument(skip(state, req))]
pub async fn create<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    admin: Admin,
    Json(req): Json<NewActivity>,
) -> Result<(StatusCode, Json<ActivityResponse>), ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let activity = state.flash_sales.create(req).await?;
    state.audit.record(AuditRecord::new(
        "flash_sale.create",
        RESOURCE,
        activity.id,
        admin.0,
        serde_json::json!({
            "title": activity.title,
            "lines": activity.products.len(),
        }),
    ));
    Ok((StatusCode::CREATED, Json(activity.into())))
}

/// GET /mall/flash-sale: every activity, newest start first.
#[tracing::instrument(skip(state))]
pub async fn list<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
) -> Result<Json<Vec<ActivityResponse>>, ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let activities = state.flash_sales.list().await?;
    Ok(Json(activities.into_iter().map(Into::into).collect()))
}

/// GET /mall/flash-sale/{id}: one activity with its lines.
#[tracing::instrument(skip(state))]
pub async fn get<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
) -> Result<Json<ActivityResponse>, ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let activity_id: ActivityId = parse_id(&id, "activity")?;
    let activity = state.flash_sales.get(activity_id).await?;
    Ok(Json(activity.into()))
}

/// PUT /mall/flash-sale/{id}: patch title, window or status.
#[tracing::instrument(skip(state, patch))]
pub async fn update<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    admin: Admin,
    Path(id): Path<String>,
    Json(patch): Json<ActivityPatch>,
) -> Result<Json<ActivityResponse>, ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let activity_id: ActivityId = parse_id(&id, "activity")?;
    let details = serde_json::to_value(&patch).unwrap_or_default();

    let activity = state.flash_sales.update(activity_id, patch).await?;
    state.audit.record(AuditRecord::new(
        "flash_sale.update",
        RESOURCE,
        activity_id,
        admin.0,
        details,
    ));
    Ok(Json(activity.into()))
}

/// DELETE /mall/flash-sale/{id}: delete an activity and its lines.
#[tracing::instrument(skip(state))]
pub async fn delete<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    admin: Admin,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let activity_id: ActivityId = parse_id(&id, "activity")?;
    state.flash_sales.delete(activity_id).await?;
    state.audit.record(AuditRecord::new(
        "flash_sale.delete",
        RESOURCE,
        activity_id,
        admin.0,
        serde_json::Value::Null,
    ));
    Ok(StatusCode::NO_CONTENT)
}

/// POST /mall/flash-sale/{id}/warmup: copy stock and limits into the cache.
#[tracing::instrument(skip(state))]
pub async fn warmup<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    admin: Admin,
    Path(id): Path<String>,
) -> Result<Json<WarmupResponse>, ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let activity_id: ActivityId = parse_id(&id, "activity")?;
    let report = state.warmer.warmup(activity_id).await?;
    state.audit.record(AuditRecord::new(
        "flash_sale.warmup",
        RESOURCE,
        activity_id,
        admin.0,
        serde_json::json!({
            "keysWritten": report.keys_written,
            "ttlSeconds": report.ttl.as_secs(),
        }),
    ));
    Ok(Json(report.into()))
}

// -- Buyer handlers --

/// POST /mall/flash-sale/{id}/purchase: buy a flash-sale line at the flash price.
#[tracing::instrument(skip(state, req), fields(buyer_id = %buyer.0))]
pub async fn purchase<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    buyer: Buyer,
    Path(id): Path<String>,
    Json(req): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let activity_id: ActivityId = parse_id(&id, "activity")?;
    let placed = state
        .flash_purchases
        .purchase(FlashPurchase {
            activity_id,
            sku_id: req.sku_id,
            buyer_id: buyer.0,
            quantity: req.quantity,
            receiver: req.receiver_info.into(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(placed.into())))
}
