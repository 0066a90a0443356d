//! Generic worker runtime.
//!
//! Each participating service registers a handler per task kind with a
//! [`WorkerSet`]; starting the set spawns a configurable number of pollers
//! per kind. Handlers are plain async closures over [`Payload`](common::Payload);
//! failures and panics inside a handler become failed task results, never
//! crashes of the runtime. Exactly one result is reported per consumed
//! task.

pub mod handler;
pub mod runtime;

pub use handler::{HandlerError, HandlerOutcome, TaskHandler};
pub use runtime::{WorkerConfig, WorkerSet, WorkerSetHandle};
