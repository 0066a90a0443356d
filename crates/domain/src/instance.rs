//! Saga instances and their step execution log.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{BUSINESS_KEY, InstanceId, Payload, TaskId};
use serde::{Deserialize, Serialize};

use crate::definition::SagaDefinition;
use crate::state::{SagaStatus, StepDirection, StepStatus};

/// One execution attempt of a saga step, forward or compensating.
///
/// Records are appended to the instance log and never removed; a
/// compensation retry appends a fresh record with a higher attempt number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    /// Index of the step in the saga definition.
    pub step_index: usize,

    /// The task kind dispatched for this record.
    pub task_kind: String,

    /// Forward action or compensating action.
    pub direction: StepDirection,

    /// Lifecycle state of this record.
    pub status: StepStatus,

    /// The task correlating this record with a worker's result.
    pub task_id: TaskId,

    /// Attempt number, starting at 1. Greater than 1 only for
    /// compensation retries.
    pub attempt: u32,

    /// Snapshot of the context handed to the worker.
    pub input_data: Payload,

    /// Data reported back by the worker on success.
    pub output_data: Payload,

    /// Reason reported on failure, if any.
    pub failure_reason: Option<String>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the task was enqueued, if it has been.
    pub dispatched_at: Option<DateTime<Utc>>,

    /// When a result was recorded, if one has been.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A live execution of a saga definition.
///
/// Created by the coordinator when a trigger starts a saga; mutated only by
/// the coordinator (serialized per instance); archived once terminal. All
/// transitions are no-ops outside their valid source state, so duplicate
/// task results cannot double-apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    instance_id: InstanceId,
    definition_name: String,
    business_key: String,
    status: SagaStatus,
    current_step_index: usize,
    context: Payload,
    steps: Vec<StepExecution>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Creates a new instance at step 0 in the `Running` state.
    ///
    /// The initial input becomes the starting context, which always
    /// carries the business key under [`BUSINESS_KEY`].
    pub fn new(
        definition_name: impl Into<String>,
        business_key: impl Into<String>,
        initial_input: Payload,
    ) -> Self {
        let business_key = business_key.into();
        let mut context = initial_input;
        context.set(BUSINESS_KEY, business_key.clone());

        let now = Utc::now();
        Self {
            instance_id: InstanceId::new(),
            definition_name: definition_name.into(),
            business_key,
            status: SagaStatus::Running,
            current_step_index: 0,
            context,
            steps: Vec::new(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reassembles an instance from persisted parts. Intended for result
    /// store implementations only.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        instance_id: InstanceId,
        definition_name: String,
        business_key: String,
        status: SagaStatus,
        current_step_index: usize,
        context: Payload,
        steps: Vec<StepExecution>,
        failure_reason: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id,
            definition_name,
            business_key,
            status,
            current_step_index,
            context,
            steps,
            failure_reason,
            created_at,
            updated_at,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn definition_name(&self) -> &str {
        &self.definition_name
    }

    pub fn business_key(&self) -> &str {
        &self.business_key
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    /// Returns the merged context: initial input plus the outputs of every
    /// succeeded forward step so far.
    pub fn context(&self) -> &Payload {
        &self.context
    }

    /// Returns the append-only step execution log.
    pub fn steps(&self) -> &[StepExecution] {
        &self.steps
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Appends a fresh `Pending` step execution record and returns the
    /// task ID minted for it.
    pub fn begin_step(
        &mut self,
        step_index: usize,
        task_kind: &str,
        direction: StepDirection,
        attempt: u32,
        input_data: Payload,
    ) -> TaskId {
        let task_id = TaskId::new();
        self.steps.push(StepExecution {
            step_index,
            task_kind: task_kind.to_string(),
            direction,
            status: StepStatus::Pending,
            task_id,
            attempt,
            input_data,
            output_data: Payload::new(),
            failure_reason: None,
            created_at: Utc::now(),
            dispatched_at: None,
            completed_at: None,
        });
        self.touch();
        task_id
    }

    /// Marks the record for `task_id` as dispatched, stamping the dispatch
    /// time. Re-dispatch of an already-dispatched record refreshes the
    /// stamp (lease-expiry recovery).
    pub fn mark_dispatched(&mut self, task_id: TaskId) -> bool {
        let Some(step) = self.step_by_task_mut(task_id) else {
            return false;
        };
        if !matches!(step.status, StepStatus::Pending | StepStatus::Dispatched) {
            return false;
        }
        step.status = StepStatus::Dispatched;
        step.dispatched_at = Some(Utc::now());
        self.touch();
        true
    }

    /// Marks a dispatched record as succeeded and records its output.
    ///
    /// Forward outputs are merged into the running context so they are
    /// available as input to later steps; compensation outputs are kept on
    /// the record only. Returns false (and changes nothing) if the record
    /// is not currently dispatched — the duplicate-delivery guard.
    pub fn complete_step(&mut self, task_id: TaskId, output_data: &Payload) -> bool {
        let Some(step) = self.step_by_task_mut(task_id) else {
            return false;
        };
        if step.status != StepStatus::Dispatched {
            return false;
        }
        step.status = StepStatus::Succeeded;
        step.output_data = output_data.clone();
        step.completed_at = Some(Utc::now());
        let merge = step.direction == StepDirection::Forward;
        if merge {
            self.context.merge(output_data);
        }
        self.touch();
        true
    }

    /// Marks a pending or dispatched record as failed.
    pub fn fail_step(&mut self, task_id: TaskId, reason: &str) -> bool {
        let Some(step) = self.step_by_task_mut(task_id) else {
            return false;
        };
        if !matches!(step.status, StepStatus::Pending | StepStatus::Dispatched) {
            return false;
        }
        step.status = StepStatus::Failed;
        step.failure_reason = Some(reason.to_string());
        step.completed_at = Some(Utc::now());
        self.touch();
        true
    }

    /// Advances the forward cursor to the next step.
    pub fn advance(&mut self) {
        if self.status.can_advance() {
            self.current_step_index += 1;
            self.touch();
        }
    }

    /// Running → Completed.
    pub fn complete(&mut self) -> bool {
        if self.status != SagaStatus::Running {
            return false;
        }
        self.status = SagaStatus::Completed;
        self.touch();
        true
    }

    /// Running → Compensating, recording the triggering failure.
    pub fn begin_compensation(&mut self, reason: &str) -> bool {
        if !self.status.can_compensate() {
            return false;
        }
        self.status = SagaStatus::Compensating;
        self.failure_reason = Some(reason.to_string());
        self.touch();
        true
    }

    /// Compensating → Compensated.
    pub fn mark_compensated(&mut self) -> bool {
        if self.status != SagaStatus::Compensating {
            return false;
        }
        self.status = SagaStatus::Compensated;
        self.touch();
        true
    }

    /// Compensating → Failed, for a compensation that exhausted its retries.
    pub fn mark_failed(&mut self, reason: &str) -> bool {
        if self.status != SagaStatus::Compensating {
            return false;
        }
        self.status = SagaStatus::Failed;
        self.failure_reason = Some(reason.to_string());
        self.touch();
        true
    }

    /// Returns the record currently awaiting dispatch or a result, if any.
    /// The invariant is that at most one record is in such a state.
    pub fn active_step(&self) -> Option<&StepExecution> {
        self.steps
            .iter()
            .rev()
            .find(|s| matches!(s.status, StepStatus::Pending | StepStatus::Dispatched))
    }

    /// Finds the record for a task ID, newest first.
    pub fn step_by_task(&self, task_id: TaskId) -> Option<&StepExecution> {
        self.steps.iter().rev().find(|s| s.task_id == task_id)
    }

    fn step_by_task_mut(&mut self, task_id: TaskId) -> Option<&mut StepExecution> {
        self.steps.iter_mut().rev().find(|s| s.task_id == task_id)
    }

    /// Returns the highest step index still to be unwound: a succeeded
    /// forward step that defines a compensating kind and has not been
    /// compensated yet. `None` means the unwind is finished.
    ///
    /// Recomputed from the log rather than stored, so a restarted
    /// coordinator resumes the unwind where it left off.
    pub fn next_compensation_target(&self, definition: &SagaDefinition) -> Option<usize> {
        let compensated: HashSet<usize> = self
            .steps
            .iter()
            .filter(|s| {
                s.direction == StepDirection::Compensation && s.status == StepStatus::Succeeded
            })
            .map(|s| s.step_index)
            .collect();

        self.steps
            .iter()
            .filter(|s| s.direction == StepDirection::Forward && s.status == StepStatus::Succeeded)
            .filter(|s| {
                definition
                    .step(s.step_index)
                    .is_some_and(|d| d.compensation_kind.is_some())
            })
            .filter(|s| !compensated.contains(&s.step_index))
            .map(|s| s.step_index)
            .max()
    }

    /// Returns how many compensation attempts have been recorded for a
    /// step index.
    pub fn compensation_attempts(&self, step_index: usize) -> u32 {
        self.steps
            .iter()
            .filter(|s| s.direction == StepDirection::Compensation && s.step_index == step_index)
            .map(|s| s.attempt)
            .max()
            .unwrap_or(0)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
