//! Coordinator error types.

use common::InstanceId;
use domain::SagaStatus;
use result_store::StoreError;
use thiserror::Error;

/// Errors surfaced by coordinator operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The requested definition is not registered.
    #[error("unknown saga definition '{0}'")]
    DefinitionNotFound(String),

    /// An active instance already exists for the business key.
    #[error("duplicate business key '{0}': an active saga instance already exists")]
    DuplicateBusinessKey(String),

    /// The instance does not exist.
    #[error("saga instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// The instance is not in a state that permits the operation.
    #[error("saga instance {instance_id} is {status}, cannot {operation}")]
    InvalidState {
        instance_id: InstanceId,
        status: SagaStatus,
        operation: &'static str,
    },

    /// Result store error.
    #[error("result store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, SagaError>;
