//! Flash-sale purchases.
//!
//! Purchases go through the store under row locks, the same way regular
//! checkout does. The flash line is locked first, then its SKU; regular
//! checkout never locks lines, so the two paths cannot wait on each other in
//! a cycle. The cache is not consulted or decremented.

use chrono::Utc;
use common::{ActivityId, BuyerId, SkuId};
use domain::{CheckoutConfig, OrderAssembler, PlacedOrder, validate_receiver};
use store::{FlashSalePurchase, ReceiverInfo, Store, Transaction};

use crate::{FlashSaleError, Result};

/// Request to buy one flash-sale line.
#[derive(Debug, Clone)]
pub struct FlashPurchase {
    pub activity_id: ActivityId,
    pub sku_id: SkuId,
    pub buyer_id: BuyerId,
    pub quantity: u32,
    pub receiver: ReceiverInfo,
}

/// Places orders for flash-sale lines at the flash price.
pub struct FlashSalePurchaseService<S: Store> {
    store: S,
    config: CheckoutConfig,
}

impl<S: Store> FlashSalePurchaseService<S> {
    /// Creates a new purchase service.
    pub fn new(store: S, config: CheckoutConfig) -> Self {
        Self { store, config }
    }

    /// Buys `quantity` units of a line for a buyer.
    ///
    /// Decrements both the line stock and the SKU stock, writes the order and
    /// records the purchase against the buyer's limit, all in one transaction.
    #[tracing::instrument(
        skip(self, request),
        fields(
            activity_id = %request.activity_id,
            sku_id = %request.sku_id,
            buyer_id = %request.buyer_id
        )
    )]
    pub async fn purchase(&self, request: FlashPurchase) -> Result<PlacedOrder> {
        if let Err(err) = validate(&request) {
            metrics::counter!("flash_sale_purchases_total", "outcome" => err.reason())
                .increment(1);
            return Err(err);
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        let result = loop {
            match self.try_purchase(&request).await {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(attempt, error = %err, "flash purchase contended, retrying");
                    attempt += 1;
                }
                outcome => break outcome,
            }
        };

        match &result {
            Ok(placed) => {
                metrics::counter!("flash_sale_purchases_total", "outcome" => "placed")
                    .increment(1);
                tracing::info!(
                    order_id = %placed.order.id,
                    order_no = %placed.order.order_no,
                    quantity = request.quantity,
                    "flash-sale purchase placed"
                );
            }
            Err(err) => {
                metrics::counter!("flash_sale_purchases_total", "outcome" => err.reason())
                    .increment(1);
                tracing::info!(error = %err, attempts = attempt, "flash-sale purchase rejected");
            }
        }
        result
    }

    async fn try_purchase(&self, request: &FlashPurchase) -> Result<PlacedOrder> {
        let mut tx = self.store.begin().await?;
        let outcome = purchase_in(&mut tx, request).await;
        store::complete(tx, outcome).await
    }
}

fn validate(request: &FlashPurchase) -> Result<()> {
    if request.quantity == 0 {
        return Err(FlashSaleError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }
    validate_receiver(&request.receiver)?;
    Ok(())
}

async fn purchase_in<Tx: Transaction>(tx: &mut Tx, request: &FlashPurchase) -> Result<PlacedOrder> {
    let FlashPurchase {
        activity_id,
        sku_id,
        buyer_id,
        quantity,
        ..
    } = *request;

    let activity = tx
        .find_activity(activity_id)
        .await?
        .ok_or(FlashSaleError::ActivityNotFound(activity_id))?;
    if !activity.is_open_at(Utc::now()) {
        return Err(FlashSaleError::NotActive(activity_id));
    }

    let line = tx
        .lock_flash_sale_product(activity_id, sku_id)
        .await?
        .ok_or(FlashSaleError::LineNotFound {
            activity_id,
            sku_id,
        })?;

    let purchased = tx.purchased_quantity(activity_id, sku_id, buyer_id).await?;
    if purchased.saturating_add(quantity) > line.limit_per_user {
        return Err(FlashSaleError::LimitExceeded {
            sku_id,
            limit: line.limit_per_user,
            purchased,
            requested: quantity,
        });
    }
    if i64::from(line.stock) < i64::from(quantity) {
        return Err(FlashSaleError::InsufficientStock {
            sku_id,
            requested: quantity,
            available: line.stock,
        });
    }

    let locked = tx
        .lock_sku(sku_id)
        .await?
        .ok_or(FlashSaleError::SkuNotFound(sku_id))?;
    if i64::from(locked.sku.stock) < i64::from(quantity) {
        return Err(FlashSaleError::InsufficientStock {
            sku_id,
            requested: quantity,
            available: locked.sku.stock,
        });
    }

    tx.decrement_flash_sale_stock(line.id, quantity).await?;
    tx.decrement_sku_stock(sku_id, quantity).await?;

    let mut assembler = OrderAssembler::new(buyer_id, request.receiver.clone());
    assembler.add_line_at_price(&locked, quantity, line.flash_price)?;
    let placed = assembler.persist(tx).await?;

    tx.insert_flash_sale_purchase(&FlashSalePurchase {
        activity_id,
        sku_id,
        buyer_id,
        order_id: placed.order.id,
        quantity,
        created_at: placed.order.created_at,
    })
    .await?;

    Ok(placed)
}
