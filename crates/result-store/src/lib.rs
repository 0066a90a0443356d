//! Durable record of saga instance state and step results.
//!
//! The coordinator persists every instance transition here; the store is
//! queried by business key (duplicate-trigger guard), by instance ID
//! (status lookups, resumption after a restart), and for all non-terminal
//! instances (replay of unacknowledged tasks on recovery).

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryResultStore;
pub use postgres::PostgresResultStore;
pub use store::ResultStore;
