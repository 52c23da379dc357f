//! Order placement request.

use std::collections::BTreeMap;

use common::{BuyerId, SkuId};
use serde::{Deserialize, Serialize};
use store::ReceiverInfo;

use crate::{OrderError, Result};

/// One requested line: a SKU and how many of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku_id: SkuId,
    pub quantity: u32,
}

impl OrderLine {
    /// Creates a new line.
    pub fn new(sku_id: SkuId, quantity: u32) -> Self {
        Self { sku_id, quantity }
    }
}

/// Request to place an order for a buyer.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The buyer placing the order.
    pub buyer_id: BuyerId,

    /// Requested lines. The same SKU may appear more than once.
    pub items: Vec<OrderLine>,

    /// Delivery address copied onto the order.
    pub receiver: ReceiverInfo,
}

impl PlaceOrder {
    /// Creates a new PlaceOrder request.
    pub fn new(buyer_id: BuyerId, items: Vec<OrderLine>, receiver: ReceiverInfo) -> Self {
        Self {
            buyer_id,
            items,
            receiver,
        }
    }

    /// Validates the request and returns its lines merged per SKU.
    ///
    /// The returned lines are sorted by ascending SKU id, which is the order
    /// rows must be locked in.
    pub fn validated_lines(&self) -> Result<Vec<OrderLine>> {
        if self.items.is_empty() {
            return Err(OrderError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }
        validate_receiver(&self.receiver)?;

        let mut merged: BTreeMap<SkuId, u32> = BTreeMap::new();
        for line in &self.items {
            if line.quantity == 0 {
                return Err(OrderError::Validation(format!(
                    "quantity for SKU {} must be at least 1",
                    line.sku_id
                )));
            }
            let total = merged.entry(line.sku_id).or_default();
            *total = total.checked_add(line.quantity).ok_or_else(|| {
                OrderError::Validation(format!("quantity for SKU {} is too large", line.sku_id))
            })?;
        }

        Ok(merged
            .into_iter()
            .map(|(sku_id, quantity)| OrderLine { sku_id, quantity })
            .collect())
    }
}

/// Checks that every receiver field has content.
pub fn validate_receiver(receiver: &ReceiverInfo) -> Result<()> {
    let fields = [
        ("name", &receiver.name),
        ("phone", &receiver.phone),
        ("address", &receiver.address),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(OrderError::Validation(format!(
                "receiver {field} must not be empty"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver() -> ReceiverInfo {
        ReceiverInfo {
            name: "Ada".to_string(),
            phone: "555-0100".to_string(),
            address: "1 Main St".to_string(),
        }
    }

    #[test]
    fn empty_order_is_rejected() {
        let cmd = PlaceOrder::new(BuyerId::new(), vec![], receiver());
        assert!(matches!(
            cmd.validated_lines(),
            Err(OrderError::Validation(_))
        ));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let cmd = PlaceOrder::new(
            BuyerId::new(),
            vec![OrderLine::new(SkuId::new(), 0)],
            receiver(),
        );
        assert!(matches!(
            cmd.validated_lines(),
            Err(OrderError::Validation(_))
        ));
    }

    #[test]
    fn blank_receiver_field_is_rejected() {
        let mut info = receiver();
        info.phone = "   ".to_string();
        let cmd = PlaceOrder::new(BuyerId::new(), vec![OrderLine::new(SkuId::new(), 1)], info);

        let err = cmd.validated_lines().unwrap_err();
        assert!(err.to_string().contains("phone"));
    }

    #[test]
    fn duplicate_skus_are_merged_and_sorted() {
        let a = SkuId::new();
        let b = SkuId::new();
        let (low, high) = if a < b { (a, b) } else { (b, a) };

        let cmd = PlaceOrder::new(
            BuyerId::new(),
            vec![
                OrderLine::new(high, 1),
                OrderLine::new(low, 2),
                OrderLine::new(high, 4),
            ],
            receiver(),
        );

        let lines = cmd.validated_lines().unwrap();
        assert_eq!(lines, vec![OrderLine::new(low, 2), OrderLine::new(high, 5)]);
    }

    #[test]
    fn merged_quantity_overflow_is_rejected() {
        let sku = SkuId::new();
        let cmd = PlaceOrder::new(
            BuyerId::new(),
            vec![OrderLine::new(sku, u32::MAX), OrderLine::new(sku, 1)],
            receiver(),
        );
        assert!(matches!(
            cmd.validated_lines(),
            Err(OrderError::Validation(_))
        ));
    }
}
