//! Service-local datastores and their task handlers.
//!
//! Each service owns its state behind an `Arc<RwLock<_>>` and exposes one
//! method per task kind it serves. Every handler keys its side effects on
//! the business key, so a redelivered task finds the work already done and
//! reports the same outcome again.

pub mod cart;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod warehouse;

pub use cart::CartService;
pub use inventory::InventoryService;
pub use order::OrderService;
pub use payment::{FRAUD_AMOUNT_LIMIT, PaymentService};
pub use warehouse::WarehouseService;
