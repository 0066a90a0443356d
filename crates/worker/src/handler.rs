//! Task handler contract.

use async_trait::async_trait;
use common::{Payload, PayloadError};
use thiserror::Error;

/// Successful outcomes a handler can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The action ran; `Payload` carries its output data.
    Completed(Payload),

    /// The action was unnecessary — the resource is already in the target
    /// state. Reported as `NotApplicable`, which the coordinator counts as
    /// success.
    NotApplicable,
}

/// Errors a handler can raise. Converted into a failed task result by the
/// runtime; handlers never crash their poller.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The input payload is missing or has malformed fields.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The action itself failed.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Creates a failure with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed(reason.into())
    }
}

/// A unit of business logic bound to one task kind.
///
/// Implemented for any async closure over the input payload, so services
/// register functions rather than types. Handlers mutate their service's
/// local datastore and MUST be idempotent on the business key: redelivery
/// can invoke them again with the same input.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Executes the action for one task.
    async fn handle(&self, input: Payload) -> Result<HandlerOutcome, HandlerError>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<HandlerOutcome, HandlerError>> + Send,
{
    async fn handle(&self, input: Payload) -> Result<HandlerOutcome, HandlerError> {
        (self)(input).await
    }
}
