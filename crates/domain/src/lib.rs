//! Saga model for the orchestration core.
//!
//! A [`SagaDefinition`] is the static description of a multi-step business
//! transaction: an ordered list of task kinds, each optionally paired with
//! a compensating task kind. A [`SagaInstance`] is one live execution of a
//! definition, keyed by a business key, carrying the merged context and the
//! append-only log of [`StepExecution`] records the coordinator drives.

pub mod definition;
pub mod instance;
pub mod registry;
pub mod state;

pub use definition::{DefinitionError, SagaDefinition, SagaDefinitionBuilder, StepDefinition};
pub use instance::{SagaInstance, StepExecution};
pub use registry::DefinitionRegistry;
pub use state::{ParseStatusError, SagaStatus, StepDirection, StepStatus};
