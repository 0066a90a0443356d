//! Saga coordination core.
//!
//! The [`SagaCoordinator`] advances saga instances step by step: it
//! dispatches each step's task on the channel, consumes task results,
//! merges step outputs into the instance context, and unwinds completed
//! steps through their compensating tasks when a step fails.
//!
//! State transitions are serialized per instance while unrelated instances
//! proceed in parallel; every transition is persisted to the result store
//! so a restarted coordinator can resume where it left off.

pub mod config;
pub mod coordinator;
pub mod error;

pub use config::CoordinatorConfig;
pub use coordinator::SagaCoordinator;
pub use error::SagaError;
