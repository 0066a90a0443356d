use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{InstanceId, TaskId};
use domain::SagaInstance;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::ResultStore;
use crate::Result;

#[derive(Default)]
struct StoreState {
    instances: HashMap<InstanceId, SagaInstance>,
    tasks: HashMap<TaskId, InstanceId>,
}

/// In-memory result store used by the default wiring and the tests.
///
/// Provides the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryResultStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryResultStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored instances.
    pub async fn instance_count(&self) -> usize {
        self.state.read().await.instances.len()
    }

    fn index_tasks(state: &mut StoreState, instance: &SagaInstance) {
        let instance_id = instance.instance_id();
        for step in instance.steps() {
            state.tasks.insert(step.task_id, instance_id);
        }
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn insert(&self, instance: &SagaInstance) -> Result<()> {
        let mut state = self.state.write().await;

        let duplicate = state.instances.values().any(|existing| {
            existing.business_key() == instance.business_key()
                && !existing.status().is_terminal()
        });
        if duplicate {
            return Err(StoreError::DuplicateBusinessKey(
                instance.business_key().to_string(),
            ));
        }

        Self::index_tasks(&mut state, instance);
        state
            .instances
            .insert(instance.instance_id(), instance.clone());
        Ok(())
    }

    async fn update(&self, instance: &SagaInstance) -> Result<()> {
        let mut state = self.state.write().await;

        if !state.instances.contains_key(&instance.instance_id()) {
            return Err(StoreError::InstanceNotFound(instance.instance_id()));
        }

        Self::index_tasks(&mut state, instance);
        state
            .instances
            .insert(instance.instance_id(), instance.clone());
        Ok(())
    }

    async fn get(&self, instance_id: InstanceId) -> Result<Option<SagaInstance>> {
        let state = self.state.read().await;
        Ok(state.instances.get(&instance_id).cloned())
    }

    async fn find_active_by_business_key(
        &self,
        business_key: &str,
    ) -> Result<Option<SagaInstance>> {
        let state = self.state.read().await;
        Ok(state
            .instances
            .values()
            .find(|instance| {
                instance.business_key() == business_key && !instance.status().is_terminal()
            })
            .cloned())
    }

    async fn find_by_task(&self, task_id: TaskId) -> Result<Option<InstanceId>> {
        let state = self.state.read().await;
        Ok(state.tasks.get(&task_id).copied())
    }

    async fn list_non_terminal(&self) -> Result<Vec<SagaInstance>> {
        let state = self.state.read().await;
        Ok(state
            .instances
            .values()
            .filter(|instance| !instance.status().is_terminal())
            .cloned()
            .collect())
    }
}
