//! Builds an order and its item snapshots from locked SKU rows.

use chrono::{DateTime, Utc};
use common::{BuyerId, Money, OrderId, OrderItemId};
use serde::Serialize;
use store::{LockedSku, Order, OrderItem, OrderStatus, ReceiverInfo, StoreError, Transaction};

use super::generate_order_no;
use crate::{OrderError, Result};

/// An order together with its items, as written or read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Accumulates order lines inside a transaction.
///
/// Each line snapshots the product name, image and SKU specs from the locked
/// row, so later catalog edits never change a placed order.
#[derive(Debug)]
pub struct OrderAssembler {
    order_id: OrderId,
    buyer_id: BuyerId,
    receiver: ReceiverInfo,
    items: Vec<OrderItem>,
    total: Money,
}

impl OrderAssembler {
    /// Starts a new order for a buyer.
    pub fn new(buyer_id: BuyerId, receiver: ReceiverInfo) -> Self {
        Self {
            order_id: OrderId::new(),
            buyer_id,
            receiver,
            items: Vec::new(),
            total: Money::zero(),
        }
    }

    /// Returns the id the order will be written with.
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Adds a line priced at the SKU's current price.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the line or order total overflows.
    pub fn add_line(&mut self, locked: &LockedSku, quantity: u32) -> Result<()> {
        self.add_line_at_price(locked, quantity, locked.sku.price)
    }

    /// Adds a line with an explicit unit price.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the line or order total overflows. The
    /// assembler is left unchanged in that case.
    pub fn add_line_at_price(
        &mut self,
        locked: &LockedSku,
        quantity: u32,
        price: Money,
    ) -> Result<()> {
        let item = OrderItem {
            id: OrderItemId::new(),
            order_id: self.order_id,
            product_id: locked.sku.product_id,
            sku_id: locked.sku.id,
            product_name: locked.product_name.clone(),
            product_image: locked.product_image.clone(),
            specs: locked.sku.specs.clone(),
            price,
            quantity,
        };
        let sku_id = item.sku_id;
        let total = item
            .line_total()
            .and_then(|line_total| self.total.checked_add(line_total))
            .ok_or_else(|| {
                OrderError::Validation(format!("order total overflows at SKU {sku_id}"))
            })?;
        self.total = total;
        self.items.push(item);
        Ok(())
    }

    /// Sum of every line total so far.
    pub fn total(&self) -> Money {
        self.total
    }

    /// Builds the order rows. No discounts apply, so the pay amount equals the total.
    pub fn finish(self, order_no: String, created_at: DateTime<Utc>) -> PlacedOrder {
        let order = Order {
            id: self.order_id,
            order_no,
            buyer_id: self.buyer_id,
            total_amount: self.total,
            pay_amount: self.total,
            status: OrderStatus::PendingPay,
            receiver: self.receiver,
            created_at,
        };
        PlacedOrder {
            order,
            items: self.items,
        }
    }

    /// Writes the order and its items through the transaction with a fresh order number.
    pub async fn persist<Tx: Transaction>(
        self,
        tx: &mut Tx,
    ) -> std::result::Result<PlacedOrder, StoreError> {
        let now = Utc::now();
        let placed = self.finish(generate_order_no(now), now);
        tx.insert_order(&placed.order).await?;
        tx.insert_order_items(&placed.items).await?;
        Ok(placed)
    }
}
