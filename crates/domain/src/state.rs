//! Saga and step state machines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing a persisted status string fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status value '{0}'")]
pub struct ParseStatusError(pub String);

/// The state of a saga instance in its lifecycle.
///
/// State transitions:
/// ```text
/// Running ──┬──► Completed
///           └──► Compensating ──┬──► Compensated
///                               └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaStatus {
    /// Forward steps are being executed.
    Running,

    /// All forward steps succeeded (terminal state).
    Completed,

    /// A step failed and compensating tasks are being executed.
    Compensating,

    /// All required compensations succeeded (terminal state).
    Compensated,

    /// A compensating task exhausted its retries; operator intervention
    /// is required (terminal state).
    Failed,
}

impl SagaStatus {
    /// Returns true if forward steps may still be dispatched.
    pub fn can_advance(&self) -> bool {
        matches!(self, SagaStatus::Running)
    }

    /// Returns true if compensation can begin from this state.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaStatus::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Running => "Running",
            SagaStatus::Completed => "Completed",
            SagaStatus::Compensating => "Compensating",
            SagaStatus::Compensated => "Compensated",
            SagaStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SagaStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(SagaStatus::Running),
            "Completed" => Ok(SagaStatus::Completed),
            "Compensating" => Ok(SagaStatus::Compensating),
            "Compensated" => Ok(SagaStatus::Compensated),
            "Failed" => Ok(SagaStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// The state of a single step execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    /// Record created, task not yet handed to the channel.
    Pending,

    /// Task enqueued and awaiting a result.
    Dispatched,

    /// The task reported success (terminal).
    Succeeded,

    /// The task reported failure or timed out (terminal).
    Failed,
}

impl StepStatus {
    /// Returns true if no further result is expected for this record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "Pending",
            StepStatus::Dispatched => "Dispatched",
            StepStatus::Succeeded => "Succeeded",
            StepStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(StepStatus::Pending),
            "Dispatched" => Ok(StepStatus::Dispatched),
            "Succeeded" => Ok(StepStatus::Succeeded),
            "Failed" => Ok(StepStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Whether a step execution runs a forward action or a compensating one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepDirection {
    /// The step's forward action.
    Forward,

    /// The inverse action undoing a previously succeeded step.
    Compensation,
}

impl StepDirection {
    /// Returns the direction name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepDirection::Forward => "Forward",
            StepDirection::Compensation => "Compensation",
        }
    }
}

impl std::fmt::Display for StepDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StepDirection {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Forward" => Ok(StepDirection::Forward),
            "Compensation" => Ok(StepDirection::Compensation),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}
