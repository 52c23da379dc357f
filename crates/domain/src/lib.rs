//! Order placement for the mall core.
//!
//! This crate provides:
//! - `PlaceOrder` request validation, merging duplicate SKU lines
//! - The order assembler that snapshots product data and totals lines
//! - `OrderService`, which locks SKUs in ascending id order, deducts stock,
//!   and writes the order and its items in one transaction

pub mod config;
pub mod error;
pub mod order;

pub use config::CheckoutConfig;
pub use error::{OrderError, Result};
pub use order::{
    OrderAssembler, OrderLine, OrderService, PlaceOrder, PlacedOrder, generate_order_no,
    validate_receiver,
};
