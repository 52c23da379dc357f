//! Relational persistence for the mall core.
//!
//! Exposes the entity shapes, the [`Store`] / [`Transaction`] traits with an
//! explicit row-lock primitive, and two implementations: an in-memory store
//! used by tests and local runs, and a PostgreSQL store.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use model::{
    ActivityStatus, FlashSaleActivity, FlashSaleProduct, FlashSalePurchase, LockedSku, Order,
    OrderItem, OrderStatus, Product, ReceiverInfo, Sku,
};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{Store, Transaction, complete};
