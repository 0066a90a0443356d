//! Static saga definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when building an invalid saga definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// A definition must have at least one step.
    #[error("saga definition '{0}' has no steps")]
    Empty(String),

    /// Task kinds double as step names and must be unique within a
    /// definition so results can be attributed unambiguously.
    #[error("saga definition '{name}' declares task kind '{kind}' more than once")]
    DuplicateTaskKind { name: String, kind: String },
}

/// One step of a saga: a forward task kind and, optionally, the task kind
/// that compensates it.
///
/// Steps without a compensating kind are treated as inherently reversible
/// (pure reads) and are skipped during unwinding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Task kind executed when the saga moves forward through this step.
    pub task_kind: String,

    /// Task kind that semantically undoes this step, if any.
    pub compensation_kind: Option<String>,
}

/// Immutable, ordered description of a multi-step saga.
///
/// Loaded once at process start and registered in a
/// [`DefinitionRegistry`](crate::DefinitionRegistry); never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaDefinition {
    name: String,
    steps: Vec<StepDefinition>,
}

impl SagaDefinition {
    /// Creates a new definition builder.
    pub fn builder(name: impl Into<String>) -> SagaDefinitionBuilder {
        SagaDefinitionBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Returns the definition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordered steps.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Returns the step at `index`, if in range.
    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    /// Returns the number of steps. Always at least one.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Builder for [`SagaDefinition`].
#[derive(Debug)]
pub struct SagaDefinitionBuilder {
    name: String,
    steps: Vec<StepDefinition>,
}

impl SagaDefinitionBuilder {
    /// Appends a step with no compensating action.
    pub fn step(mut self, task_kind: impl Into<String>) -> Self {
        self.steps.push(StepDefinition {
            task_kind: task_kind.into(),
            compensation_kind: None,
        });
        self
    }

    /// Appends a step paired with its compensating task kind.
    pub fn step_with_compensation(
        mut self,
        task_kind: impl Into<String>,
        compensation_kind: impl Into<String>,
    ) -> Self {
        self.steps.push(StepDefinition {
            task_kind: task_kind.into(),
            compensation_kind: Some(compensation_kind.into()),
        });
        self
    }

    /// Validates and builds the definition.
    pub fn build(self) -> Result<SagaDefinition, DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::Empty(self.name));
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.task_kind.as_str()) {
                return Err(DefinitionError::DuplicateTaskKind {
                    name: self.name,
                    kind: step.task_kind.clone(),
                });
            }
        }

        Ok(SagaDefinition {
            name: self.name,
            steps: self.steps,
        })
    }
}
