//! Order placement: request validation, assembly and the transactional service.

mod assembler;
mod commands;
mod order_no;
mod service;

pub use assembler::{OrderAssembler, PlacedOrder};
pub use commands::{OrderLine, PlaceOrder, validate_receiver};
pub use order_no::generate_order_no;
pub use service::OrderService;
