use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runbook::Runbook;

/// Overall status of one runbook execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Paused,
    Succeeded,
    PartialSuccess,
    Failed,
    Canceled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Running | Self::Paused => false,
            Self::Succeeded | Self::PartialSuccess | Self::Failed | Self::Canceled => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Succeeded => "succeeded",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Pending | Self::Running => false,
            Self::Succeeded | Self::Failed | Self::Skipped => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" | "success" => Some(Self::Succeeded),
            "failed" | "failure" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_id: String,
    pub name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// 1-based; 0 until the first attempt starts.
    pub attempt: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

impl StepExecution {
    pub fn pending(step_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            status: StepStatus::Pending,
            run_id: None,
            started_at: None,
            ended_at: None,
            attempt: 0,
            error_message: None,
            output: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(s), Some(e)) => Some((e - s).num_milliseconds()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunbookExecution {
    pub id: String,
    pub runbook_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_info: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub steps: Vec<StepExecution>,
}

impl RunbookExecution {
    /// Fresh `Running` record with every step `Pending`.
    pub fn new(id: impl Into<String>, runbook: &Runbook, trigger_info: Option<String>) -> Self {
        Self {
            id: id.into(),
            runbook_id: runbook.id.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            trigger_info,
            error_message: None,
            steps: runbook
                .steps
                .iter()
                .map(|s| StepExecution::pending(&s.id, s.display_name()))
                .collect(),
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&StepExecution> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut StepExecution> {
        self.steps.iter_mut().find(|s| s.step_id == step_id)
    }
}
