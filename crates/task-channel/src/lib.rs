//! Typed task queues connecting the saga coordinator to its workers.
//!
//! The coordinator pushes [`Task`]s onto a kind-specific FIFO queue;
//! worker runtimes long-poll their kind and report a [`TaskResult`] per
//! consumed task. Delivery is at-least-once: a polled task that is not
//! acknowledged within its lease window is redelivered, and a task that
//! exhausts its delivery budget surfaces as a synthetic failed result so
//! the coordinator can start compensation.

pub mod channel;
pub mod task;

pub use channel::{ChannelConfig, InMemoryTaskChannel, ReclaimSummary, TaskChannel};
pub use task::{Task, TaskResult, TaskStatus};
