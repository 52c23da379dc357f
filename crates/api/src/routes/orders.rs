//! Buyer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cache::Cache;
use chrono::{DateTime, Utc};
use common::{OrderId, SkuId};
use domain::{OrderLine, PlaceOrder, PlacedOrder};
use serde::{Deserialize, Serialize};
use store::{ReceiverInfo, Store};

use super::parse_id;
use crate::error::ApiError;
use crate::extract::Buyer;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverInfoBody {
    pub name: String,
    pub phone: String,
    pub address: String,
}

impl From<ReceiverInfoBody> for ReceiverInfo {
    fn from(body: ReceiverInfoBody) -> Self {
        ReceiverInfo {
            name: body.name,
            phone: body.phone,
            address: body.address,
        }
    }
}

impl From<ReceiverInfo> for ReceiverInfoBody {
    fn from(info: ReceiverInfo) -> Self {
        ReceiverInfoBody {
            name: info.name,
            phone: info.phone,
            address: info.address,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderLineRequest>,
    pub receiver_info: ReceiverInfoBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub sku_id: SkuId,
    pub quantity: u32,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub order_no: String,
    pub buyer_id: String,
    pub status: String,
    pub total_amount: i64,
    pub pay_amount: i64,
    pub receiver_info: ReceiverInfoBody,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: String,
    pub product_id: String,
    pub sku_id: String,
    pub product_name: String,
    pub product_image: Option<String>,
    pub specs: serde_json::Value,
    pub price: i64,
    pub quantity: u32,
}

impl From<PlacedOrder> for OrderResponse {
    fn from(placed: PlacedOrder) -> Self {
        let PlacedOrder { order, items } = placed;
        OrderResponse {
            id: order.id.to_string(),
            order_no: order.order_no,
            buyer_id: order.buyer_id.to_string(),
            status: order.status.to_string(),
            total_amount: order.total_amount.cents(),
            pay_amount: order.pay_amount.cents(),
            receiver_info: order.receiver.into(),
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: item.id.to_string(),
                    product_id: item.product_id.to_string(),
                    sku_id: item.sku_id.to_string(),
                    product_name: item.product_name,
                    product_image: item.product_image,
                    specs: item.specs,
                    price: item.price.cents(),
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /mall/orders: place an order for the calling buyer.
#[tracing::instrument(skip(state, req), fields(buyer_id = %buyer.0))]
pub async fn place<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    buyer: Buyer,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let lines = req
        .items
        .iter()
        .map(|line| OrderLine::new(line.sku_id, line.quantity))
        .collect();
    let cmd = PlaceOrder::new(buyer.0, lines, req.receiver_info.into());

    let placed = state.order_service.place_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(placed.into())))
}

/// GET /mall/orders/{id}: one of the calling buyer's orders.
#[tracing::instrument(skip(state), fields(buyer_id = %buyer.0))]
pub async fn get<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    buyer: Buyer,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: Store + Clone + 'static,
    C: Cache + Clone + 'static,
{
    let order_id: OrderId = parse_id(&id, "order")?;
    let placed = state.order_service.get_order(order_id).await?;

    // Another buyer's order is indistinguishable from a missing one.
    if placed.order.buyer_id != buyer.0 {
        return Err(ApiError::NotFound(format!("Order not found: {order_id}")));
    }
    Ok(Json(placed.into()))
}
