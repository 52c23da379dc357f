//! Entity shapes persisted by the store.

use chrono::{DateTime, Utc};
use common::{
    ActivityId, BuyerId, FlashSaleProductId, Money, OrderId, OrderItemId, ProductId, SkuId,
};
use serde::{Deserialize, Serialize};

/// A catalog product. Only the fields copied into order snapshots are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub main_image: Option<String>,
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub id: SkuId,
    pub product_id: ProductId,
    pub code: String,
    pub price: Money,
    /// Units on hand. Never negative.
    pub stock: i32,
    /// Variant attributes, e.g. `{"color": "red", "size": "M"}`.
    pub specs: serde_json::Value,
}

/// A SKU row read under an exclusive lock, joined with its product's display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedSku {
    pub sku: Sku,
    pub product_name: String,
    pub product_image: Option<String>,
}

/// The lifecycle state of an order.
///
/// ```text
/// PendingPay ──► PendingDelivery ──► Shipped ──► Delivered ──► Completed
///                                       │                         ▲
///                                       └─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, awaiting payment.
    #[default]
    PendingPay,

    /// Paid, awaiting shipment.
    PendingDelivery,

    /// Handed to the carrier.
    Shipped,

    /// Received by the buyer.
    Delivered,

    /// Closed (terminal state).
    Completed,
}

impl OrderStatus {
    /// Returns true if `next` is a legal forward transition from this state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPay, PendingDelivery)
                | (PendingDelivery, Shipped)
                | (Shipped, Delivered)
                | (Shipped, Completed)
                | (Delivered, Completed)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    /// Returns the persisted name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPay => "PENDING_PAY",
            OrderStatus::PendingDelivery => "PENDING_DELIVERY",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAY" => Ok(OrderStatus::PendingPay),
            "PENDING_DELIVERY" => Ok(OrderStatus::PendingDelivery),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "COMPLETED" => Ok(OrderStatus::Completed),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// Delivery address copied onto the order at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverInfo {
    pub name: String,
    pub phone: String,
    pub address: String,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub buyer_id: BuyerId,
    pub total_amount: Money,
    pub pay_amount: Money,
    pub status: OrderStatus,
    pub receiver: ReceiverInfo,
    pub created_at: DateTime<Utc>,
}

/// One line of an order. Product fields are a snapshot taken at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub sku_id: SkuId,
    pub product_name: String,
    pub product_image: Option<String>,
    pub specs: serde_json::Value,
    /// Unit price paid.
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    /// Returns `price * quantity`, or None if it overflows.
    pub fn line_total(&self) -> Option<Money> {
        self.price.checked_multiply(self.quantity)
    }
}

/// Whether a flash-sale activity accepts purchases inside its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    #[default]
    Enabled,
    Disabled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Enabled => "ENABLED",
            ActivityStatus::Disabled => "DISABLED",
        }
    }
}

impl std::str::FromStr for ActivityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENABLED" => Ok(ActivityStatus::Enabled),
            "DISABLED" => Ok(ActivityStatus::Disabled),
            other => Err(format!("unknown activity status '{other}'")),
        }
    }
}

/// A timed flash-sale activity and its product lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashSaleActivity {
    pub id: ActivityId,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ActivityStatus,
    /// Product lines ordered by `sort`.
    pub products: Vec<FlashSaleProduct>,
}

impl FlashSaleActivity {
    /// Returns true if the activity accepts purchases at `now`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ActivityStatus::Enabled && self.start_time <= now && now < self.end_time
    }
}

/// A SKU offered at a flash price within an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashSaleProduct {
    pub id: FlashSaleProductId,
    pub activity_id: ActivityId,
    pub product_id: ProductId,
    pub sku_id: SkuId,
    pub flash_price: Money,
    /// Units allotted to the sale. Never negative.
    pub stock: i32,
    pub limit_per_user: u32,
    pub sort: i32,
}

/// Ledger row recording a buyer's flash-sale purchase, used to enforce `limit_per_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashSalePurchase {
    pub activity_id: ActivityId,
    pub sku_id: SkuId,
    pub buyer_id: BuyerId,
    pub order_id: OrderId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}
