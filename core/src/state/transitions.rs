//! Transition rules for execution and step records.

use thiserror::Error;

use super::types::{ExecutionStatus, StepStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid execution transition from {from} to {to}")]
    InvalidExecution {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    #[error("Invalid step transition from {from} to {to}")]
    InvalidStep { from: StepStatus, to: StepStatus },
    #[error("Cannot transition from terminal execution state {state}")]
    FromTerminalExecution { state: ExecutionStatus },
    #[error("Cannot transition from terminal step state {state}")]
    FromTerminalStep { state: StepStatus },
}

pub struct StateTransition;

impl StateTransition {
    pub fn validate_execution(
        from: ExecutionStatus,
        to: ExecutionStatus,
    ) -> Result<(), TransitionError> {
        use ExecutionStatus::*;

        if from.is_terminal() {
            return Err(TransitionError::FromTerminalExecution { state: from });
        }

        let is_valid = match (from, to) {
            (Running, Paused) | (Paused, Running) => true,
            // Work already in flight may settle the run while it is paused.
            (Running | Paused, Succeeded | PartialSuccess | Failed | Canceled) => true,
            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidExecution { from, to })
        }
    }

    pub fn validate_step(from: StepStatus, to: StepStatus) -> Result<(), TransitionError> {
        use StepStatus::*;

        if from.is_terminal() {
            return Err(TransitionError::FromTerminalStep { state: from });
        }

        let is_valid = match (from, to) {
            (Pending, Running) | (Pending, Skipped) => true,
            // A step unit that dies before its first attempt is still recorded.
            (Pending, Failed) => true,
            // Attempt counter bumps keep the step Running.
            (Running, Running) => true,
            (Running, Succeeded) | (Running, Failed) => true,
            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidStep { from, to })
        }
    }
}

/// Overall terminal status for a finished (non-canceled) execution.
///
/// Every step settled as Succeeded or Skipped gives `Succeeded`; a mix of
/// successes and failures gives `PartialSuccess`; anything else, including
/// steps that were never reached, gives `Failed`.
pub fn classify<'a>(statuses: impl IntoIterator<Item = &'a StepStatus>) -> ExecutionStatus {
    let mut any_succeeded = false;
    let mut any_failed = false;
    let mut all_settled_ok = true;

    for status in statuses {
        match status {
            StepStatus::Succeeded => any_succeeded = true,
            StepStatus::Skipped => {}
            StepStatus::Failed => {
                any_failed = true;
                all_settled_ok = false;
            }
            StepStatus::Pending | StepStatus::Running => all_settled_ok = false,
        }
    }

    if all_settled_ok {
        ExecutionStatus::Succeeded
    } else if any_succeeded && any_failed {
        ExecutionStatus::PartialSuccess
    } else {
        ExecutionStatus::Failed
    }
}
