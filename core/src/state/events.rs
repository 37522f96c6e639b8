use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{ExecutionStatus, StepStatus};

/// Change notifications published after the corresponding record is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionCreated {
        execution_id: String,
        runbook_id: String,
        timestamp: DateTime<Utc>,
    },
    ExecutionStatusChanged {
        execution_id: String,
        old_status: ExecutionStatus,
        new_status: ExecutionStatus,
        #[serde(default)]
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    StepStatusChanged {
        execution_id: String,
        step_id: String,
        status: StepStatus,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        execution_id: String,
        step_id: String,
        status: StepStatus,
        attempt: u32,
        #[serde(default)]
        run_id: Option<String>,
        #[serde(default)]
        duration_ms: Option<i64>,
        #[serde(default)]
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ExecutionCreated { execution_id, .. }
            | Self::ExecutionStatusChanged { execution_id, .. }
            | Self::StepStatusChanged { execution_id, .. }
            | Self::StepCompleted { execution_id, .. } => execution_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutionCreated { .. } => "execution_created",
            Self::ExecutionStatusChanged { .. } => "execution_status_changed",
            Self::StepStatusChanged { .. } => "step_status_changed",
            Self::StepCompleted { .. } => "step_completed",
        }
    }
}
