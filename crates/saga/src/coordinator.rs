//! The saga coordinator state machine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{InstanceId, Payload, TaskId};
use domain::{DefinitionRegistry, SagaDefinition, SagaInstance, SagaStatus, StepDirection,
    StepStatus};
use result_store::{ResultStore, StoreError};
use task_channel::{Task, TaskChannel, TaskResult};
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;

use crate::config::CoordinatorConfig;
use crate::error::SagaError;

/// Drives saga instances forward and unwinds them on failure.
///
/// The coordinator owns all instance state transitions. Workers across
/// services report results concurrently, so transitions are serialized per
/// instance through a lock map while different instances proceed in
/// parallel. Every transition is persisted before the next result for the
/// instance can be processed.
pub struct SagaCoordinator<S, C>
where
    S: ResultStore,
    C: TaskChannel,
{
    store: S,
    channel: C,
    registry: Arc<DefinitionRegistry>,
    config: CoordinatorConfig,
    locks: Mutex<HashMap<InstanceId, Arc<Mutex<()>>>>,
}

impl<S, C> SagaCoordinator<S, C>
where
    S: ResultStore,
    C: TaskChannel,
{
    /// Creates a new coordinator.
    pub fn new(
        store: S,
        channel: C,
        registry: Arc<DefinitionRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            channel,
            registry,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a new saga instance for a business key.
    ///
    /// Rejects unknown definitions and business keys that already have an
    /// active instance (duplicate-submission guard). On success the first
    /// step's task is already enqueued.
    #[tracing::instrument(skip(self, input), fields(definition = %definition_name, business_key = %business_key))]
    pub async fn start(
        &self,
        definition_name: &str,
        business_key: &str,
        input: Payload,
    ) -> Result<InstanceId, SagaError> {
        let Some(definition) = self.registry.get(definition_name) else {
            return Err(SagaError::DefinitionNotFound(definition_name.to_string()));
        };

        if self
            .store
            .find_active_by_business_key(business_key)
            .await?
            .is_some()
        {
            metrics::counter!("saga_duplicate_triggers_total").increment(1);
            return Err(SagaError::DuplicateBusinessKey(business_key.to_string()));
        }

        let mut instance = SagaInstance::new(definition_name, business_key, input);
        let instance_id = instance.instance_id();

        // Record step 0 before the insert so its task ID is persisted
        // together with the instance.
        let first = &definition.steps()[0];
        let input_data = instance.context().clone();
        let task_id = instance.begin_step(
            0,
            &first.task_kind,
            StepDirection::Forward,
            1,
            input_data.clone(),
        );

        // The insert is the atomic backstop for the duplicate guard above.
        self.store.insert(&instance).await.map_err(|e| match e {
            StoreError::DuplicateBusinessKey(key) => {
                metrics::counter!("saga_duplicate_triggers_total").increment(1);
                SagaError::DuplicateBusinessKey(key)
            }
            other => SagaError::Store(other),
        })?;

        self.channel
            .enqueue(Task::new(task_id, first.task_kind.clone(), input_data))
            .await;
        instance.mark_dispatched(task_id);
        self.store.update(&instance).await?;

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(%instance_id, step = %first.task_kind, "saga started");
        Ok(instance_id)
    }

    /// Consumes one task result and advances the owning instance.
    ///
    /// Results for unknown tasks, terminal instances, or steps that are no
    /// longer dispatched are ignored — duplicate delivery is expected and
    /// all transitions are no-ops outside their valid source state.
    #[tracing::instrument(skip(self, result), fields(task_id = %result.task_id, status = %result.status))]
    pub async fn on_result(&self, result: TaskResult) -> Result<(), SagaError> {
        let Some(instance_id) = self.store.find_by_task(result.task_id).await? else {
            tracing::warn!("result for unknown task, ignoring");
            return Ok(());
        };

        let lock = self.instance_lock(instance_id).await;
        let _guard = lock.lock().await;

        let Some(mut instance) = self.store.get(instance_id).await? else {
            tracing::warn!(%instance_id, "result for archived instance, ignoring");
            return Ok(());
        };
        if instance.status().is_terminal() {
            tracing::debug!(%instance_id, "result for terminal instance, ignoring");
            return Ok(());
        }

        let Some(step) = instance.step_by_task(result.task_id) else {
            return Ok(());
        };
        if step.status != StepStatus::Dispatched {
            tracing::debug!(%instance_id, step = %step.task_kind, "stale or duplicate result ignored");
            return Ok(());
        }
        let direction = step.direction;
        let step_index = step.step_index;
        let task_kind = step.task_kind.clone();

        let Some(definition) = self.registry.get(instance.definition_name()) else {
            return Err(SagaError::DefinitionNotFound(
                instance.definition_name().to_string(),
            ));
        };

        match (instance.status(), direction) {
            (SagaStatus::Running, StepDirection::Forward) if result.status.is_success() => {
                self.forward_step_succeeded(
                    &mut instance,
                    definition,
                    &result,
                    step_index,
                    &task_kind,
                )
                .await;
            }
            (SagaStatus::Running, StepDirection::Forward) => {
                let reason = result
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "task failed".to_string());
                self.forward_step_failed(
                    &mut instance,
                    definition,
                    result.task_id,
                    &task_kind,
                    &reason,
                )
                .await;
            }
            (SagaStatus::Compensating, StepDirection::Compensation)
                if result.status.is_success() =>
            {
                instance.complete_step(result.task_id, &result.output_data);
                tracing::info!(step = %task_kind, index = step_index, "compensation step succeeded");
                self.continue_compensation(&mut instance, definition).await;
            }
            (SagaStatus::Compensating, StepDirection::Compensation) => {
                let reason = result
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "task failed".to_string());
                self.compensation_step_failed(
                    &mut instance,
                    definition,
                    result.task_id,
                    step_index,
                    &task_kind,
                    &reason,
                )
                .await;
            }
            (status, direction) => {
                tracing::debug!(
                    %status,
                    %direction,
                    "result does not match the instance's phase, ignoring"
                );
                return Ok(());
            }
        }

        self.store.update(&instance).await?;
        if instance.status().is_terminal() {
            self.forget_lock(instance_id).await;
        }
        Ok(())
    }

    /// Forces a running instance into compensation (external abort).
    ///
    /// There is no mid-step cancellation: an already dispatched task runs
    /// to completion, but its late result is dropped because the step
    /// record is failed here first.
    #[tracing::instrument(skip(self))]
    pub async fn abort(&self, instance_id: InstanceId) -> Result<(), SagaError> {
        let lock = self.instance_lock(instance_id).await;
        let _guard = lock.lock().await;

        let Some(mut instance) = self.store.get(instance_id).await? else {
            return Err(SagaError::InstanceNotFound(instance_id));
        };
        if instance.status() != SagaStatus::Running {
            return Err(SagaError::InvalidState {
                instance_id,
                status: instance.status(),
                operation: "abort",
            });
        }

        let Some(definition) = self.registry.get(instance.definition_name()) else {
            return Err(SagaError::DefinitionNotFound(
                instance.definition_name().to_string(),
            ));
        };

        if let Some(task_id) = instance.active_step().map(|s| s.task_id) {
            instance.fail_step(task_id, "aborted by operator");
        }
        instance.begin_compensation("aborted by operator");
        metrics::counter!("saga_aborted_total").increment(1);
        tracing::warn!(business_key = %instance.business_key(), "saga aborted, compensating");

        self.continue_compensation(&mut instance, definition).await;
        self.store.update(&instance).await?;
        if instance.status().is_terminal() {
            self.forget_lock(instance_id).await;
        }
        Ok(())
    }

    /// Loads an instance snapshot by ID.
    pub async fn status(&self, instance_id: InstanceId) -> Result<Option<SagaInstance>, SagaError> {
        Ok(self.store.get(instance_id).await?)
    }

    /// Finds the active instance for a business key, if any.
    pub async fn find_by_business_key(
        &self,
        business_key: &str,
    ) -> Result<Option<SagaInstance>, SagaError> {
        Ok(self.store.find_active_by_business_key(business_key).await?)
    }

    /// Replays unacknowledged tasks after a coordinator restart.
    ///
    /// Any non-terminal instance whose current step is still pending, or
    /// dispatched longer ago than the lease window, gets its task
    /// re-enqueued. Returns the number of re-dispatched tasks.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize, SagaError> {
        let open = self.store.list_non_terminal().await?;
        let mut redispatched = 0;

        for snapshot in open {
            let instance_id = snapshot.instance_id();
            let lock = self.instance_lock(instance_id).await;
            let _guard = lock.lock().await;

            let Some(mut instance) = self.store.get(instance_id).await? else {
                continue;
            };
            let Some((task_id, task_kind, input_data, status, dispatched_at)) =
                instance.active_step().map(|s| {
                    (
                        s.task_id,
                        s.task_kind.clone(),
                        s.input_data.clone(),
                        s.status,
                        s.dispatched_at,
                    )
                })
            else {
                continue;
            };

            let lost = match status {
                StepStatus::Pending => true,
                StepStatus::Dispatched => dispatched_at.is_none_or(|at| {
                    match (Utc::now() - at).to_std() {
                        Ok(elapsed) => elapsed >= self.config.lease,
                        Err(_) => false,
                    }
                }),
                _ => false,
            };
            if !lost {
                continue;
            }

            tracing::info!(%instance_id, step = %task_kind, "re-dispatching unacknowledged task");
            self.channel
                .enqueue(Task::new(task_id, task_kind, input_data))
                .await;
            instance.mark_dispatched(task_id);
            self.store.update(&instance).await?;
            redispatched += 1;
        }

        if redispatched > 0 {
            metrics::counter!("saga_recovered_tasks_total").increment(redispatched as u64);
            tracing::info!(count = redispatched, "recovery re-dispatched tasks");
        }
        Ok(redispatched)
    }

    /// Consumes task results and sweeps expired leases until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("saga coordinator started");
        let mut reclaim = tokio::time::interval(self.config.reclaim_interval);
        reclaim.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = reclaim.tick() => {
                    let summary = self.channel.reclaim_expired().await;
                    if summary.redelivered > 0 || summary.exhausted > 0 {
                        tracing::warn!(
                            redelivered = summary.redelivered,
                            exhausted = summary.exhausted,
                            "reclaimed expired task leases"
                        );
                    }
                }
                maybe = self.channel.next_result(self.config.result_poll_timeout) => {
                    if let Some(result) = maybe
                        && let Err(error) = self.on_result(result).await
                    {
                        tracing::error!(%error, "failed to process task result");
                    }
                }
            }
        }
        tracing::info!("saga coordinator stopped");
    }

    async fn forward_step_succeeded(
        &self,
        instance: &mut SagaInstance,
        definition: &SagaDefinition,
        result: &TaskResult,
        step_index: usize,
        task_kind: &str,
    ) {
        instance.complete_step(result.task_id, &result.output_data);
        tracing::info!(step = %task_kind, index = step_index, "step succeeded");

        if step_index + 1 == definition.step_count() {
            instance.complete();
            metrics::counter!("saga_completed").increment(1);
            self.record_duration(instance);
            tracing::info!(business_key = %instance.business_key(), "saga completed");
        } else {
            instance.advance();
            self.dispatch_forward(instance, definition).await;
        }
    }

    async fn forward_step_failed(
        &self,
        instance: &mut SagaInstance,
        definition: &SagaDefinition,
        task_id: TaskId,
        task_kind: &str,
        reason: &str,
    ) {
        instance.fail_step(task_id, reason);
        instance.begin_compensation(&format!("step '{task_kind}' failed: {reason}"));
        metrics::counter!("saga_compensations_total").increment(1);
        tracing::warn!(step = %task_kind, reason, "step failed, compensating");

        self.continue_compensation(instance, definition).await;
    }

    async fn compensation_step_failed(
        &self,
        instance: &mut SagaInstance,
        definition: &SagaDefinition,
        task_id: TaskId,
        step_index: usize,
        task_kind: &str,
        reason: &str,
    ) {
        instance.fail_step(task_id, reason);
        let attempts = instance.compensation_attempts(step_index);

        if attempts < self.config.max_compensation_attempts {
            tracing::warn!(
                step = %task_kind,
                attempt = attempts,
                reason,
                "compensation step failed, retrying"
            );
            self.dispatch_compensation(instance, definition, step_index, attempts + 1)
                .await;
        } else {
            instance.mark_failed(&format!(
                "compensation '{task_kind}' exhausted {attempts} attempts: {reason}"
            ));
            metrics::counter!("saga_failed").increment(1);
            self.record_duration(instance);
            tracing::error!(
                step = %task_kind,
                attempts,
                reason,
                "compensation exhausted, saga requires operator intervention"
            );
        }
    }

    /// Dispatches the next compensating task, or closes the unwind when
    /// nothing is left to undo.
    async fn continue_compensation(
        &self,
        instance: &mut SagaInstance,
        definition: &SagaDefinition,
    ) {
        match instance.next_compensation_target(definition) {
            Some(step_index) => {
                self.dispatch_compensation(instance, definition, step_index, 1)
                    .await;
            }
            None => {
                instance.mark_compensated();
                metrics::counter!("saga_compensated").increment(1);
                self.record_duration(instance);
                tracing::info!(business_key = %instance.business_key(), "saga compensated");
            }
        }
    }

    async fn dispatch_forward(&self, instance: &mut SagaInstance, definition: &SagaDefinition) {
        let index = instance.current_step_index();
        let Some(step) = definition.step(index) else {
            tracing::error!(index, "step index out of range for definition");
            return;
        };

        let input_data = instance.context().clone();
        let task_id = instance.begin_step(
            index,
            &step.task_kind,
            StepDirection::Forward,
            1,
            input_data.clone(),
        );
        self.channel
            .enqueue(Task::new(task_id, step.task_kind.clone(), input_data))
            .await;
        instance.mark_dispatched(task_id);

        metrics::counter!("saga_tasks_dispatched_total").increment(1);
        tracing::debug!(step = %step.task_kind, %task_id, "forward task dispatched");
    }

    async fn dispatch_compensation(
        &self,
        instance: &mut SagaInstance,
        definition: &SagaDefinition,
        step_index: usize,
        attempt: u32,
    ) {
        let Some(kind) = definition
            .step(step_index)
            .and_then(|s| s.compensation_kind.clone())
        else {
            return;
        };

        let input_data = instance.context().clone();
        let task_id = instance.begin_step(
            step_index,
            &kind,
            StepDirection::Compensation,
            attempt,
            input_data.clone(),
        );
        self.channel
            .enqueue(Task::new(task_id, kind.clone(), input_data))
            .await;
        instance.mark_dispatched(task_id);

        metrics::counter!("saga_tasks_dispatched_total").increment(1);
        tracing::debug!(step = %kind, %task_id, attempt, "compensating task dispatched");
    }

    fn record_duration(&self, instance: &SagaInstance) {
        let elapsed = (Utc::now() - instance.created_at()).num_milliseconds();
        metrics::histogram!("saga_duration_seconds").record(elapsed.max(0) as f64 / 1000.0);
    }

    async fn instance_lock(&self, instance_id: InstanceId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(instance_id).or_default().clone()
    }

    async fn forget_lock(&self, instance_id: InstanceId) {
        self.locks.lock().await.remove(&instance_id);
    }
}
