//! Shared types for the saga orchestration system.

pub mod payload;
pub mod types;

pub use payload::{BUSINESS_KEY, Payload, PayloadError};
pub use types::{InstanceId, TaskId};
