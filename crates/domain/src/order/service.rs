//! Order service: the transaction coordinator for order placement.

use common::OrderId;
use store::{Store, Transaction};

use crate::{CheckoutConfig, OrderError, Result};

use super::{OrderAssembler, OrderLine, PlaceOrder, PlacedOrder};

/// Places and reads orders against a [`Store`].
///
/// Placement runs in one transaction: every requested SKU row is locked in
/// ascending id order, checked and decremented, then the order and its items
/// are written. Any failure rolls the whole transaction back.
pub struct OrderService<S: Store> {
    store: S,
    config: CheckoutConfig,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service with default checkout tuning.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CheckoutConfig::default())
    }

    /// Creates a new order service with explicit checkout tuning.
    pub fn with_config(store: S, config: CheckoutConfig) -> Self {
        Self { store, config }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order.
    ///
    /// Deadlocks, lock timeouts and order number collisions are retried with a
    /// fresh transaction up to `max_attempts` times in total.
    #[tracing::instrument(skip(self, cmd), fields(buyer_id = %cmd.buyer_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<PlacedOrder> {
        let started = std::time::Instant::now();

        let lines = match cmd.validated_lines() {
            Ok(lines) => lines,
            Err(err) => {
                metrics::counter!("orders_rejected_total", "reason" => err.reason()).increment(1);
                return Err(err);
            }
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        let result = loop {
            match self.try_place(&cmd, &lines).await {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(attempt, error = %err, "order placement contended, retrying");
                    metrics::counter!("order_placement_retries_total").increment(1);
                    attempt += 1;
                }
                outcome => break outcome,
            }
        };

        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(placed) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %placed.order.id,
                    order_no = %placed.order.order_no,
                    total = %placed.order.total_amount,
                    "order placed"
                );
            }
            Err(err) => {
                metrics::counter!("orders_rejected_total", "reason" => err.reason()).increment(1);
                tracing::info!(error = %err, attempts = attempt, "order rejected");
            }
        }
        result
    }

    /// Gets an order with its items.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<PlacedOrder> {
        let (order, items) = self
            .store
            .find_order(id)
            .await?
            .ok_or(OrderError::NotFound(id))?;
        Ok(PlacedOrder { order, items })
    }

    async fn try_place(&self, cmd: &PlaceOrder, lines: &[OrderLine]) -> Result<PlacedOrder> {
        let mut tx = self.store.begin().await?;
        let outcome = place_in(&mut tx, cmd, lines).await;
        store::complete(tx, outcome).await
    }
}

/// Locks, checks and decrements every line, then writes the order.
///
/// `lines` must already be merged and sorted by SKU id.
async fn place_in<Tx: Transaction>(
    tx: &mut Tx,
    cmd: &PlaceOrder,
    lines: &[OrderLine],
) -> Result<PlacedOrder> {
    let mut assembler = OrderAssembler::new(cmd.buyer_id, cmd.receiver.clone());

    for line in lines {
        let locked = tx
            .lock_sku(line.sku_id)
            .await?
            .ok_or(OrderError::SkuNotFound(line.sku_id))?;

        if i64::from(locked.sku.stock) < i64::from(line.quantity) {
            return Err(OrderError::InsufficientStock {
                sku_id: line.sku_id,
                requested: line.quantity,
                available: locked.sku.stock,
            });
        }

        tx.decrement_sku_stock(line.sku_id, line.quantity).await?;
        assembler.add_line(&locked, line.quantity)?;
    }

    Ok(assembler.persist(tx).await?)
}
