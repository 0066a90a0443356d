use async_trait::async_trait;
use common::{InstanceId, TaskId};
use domain::SagaInstance;

use crate::Result;

/// Core trait for result store implementations.
///
/// Stores full [`SagaInstance`] snapshots including their append-only step
/// logs. All implementations must be thread-safe (Send + Sync); writes for
/// a single instance are serialized by the coordinator, so implementations
/// only need atomicity per call, not cross-call transactions.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persists a newly created instance.
    ///
    /// Fails with [`StoreError::DuplicateBusinessKey`](crate::StoreError::DuplicateBusinessKey)
    /// if a non-terminal instance already exists for the same business key.
    /// This is the atomic backstop behind the coordinator's own
    /// duplicate-trigger check.
    async fn insert(&self, instance: &SagaInstance) -> Result<()>;

    /// Persists the current state of an existing instance.
    async fn update(&self, instance: &SagaInstance) -> Result<()>;

    /// Loads an instance by ID. Returns `None` if it does not exist.
    async fn get(&self, instance_id: InstanceId) -> Result<Option<SagaInstance>>;

    /// Finds the non-terminal instance for a business key, if one exists.
    async fn find_active_by_business_key(&self, business_key: &str)
    -> Result<Option<SagaInstance>>;

    /// Resolves the instance that dispatched a task ID, if any.
    async fn find_by_task(&self, task_id: TaskId) -> Result<Option<InstanceId>>;

    /// Lists every instance that has not reached a terminal status.
    /// Used by restart recovery to replay unacknowledged tasks.
    async fn list_non_terminal(&self) -> Result<Vec<SagaInstance>>;
}
