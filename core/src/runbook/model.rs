use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::condition::StepCondition;
use super::retry::RetryPolicy;

/// A named DAG of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runbook {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub steps: Vec<RunbookStep>,
}

impl Runbook {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: None,
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: RunbookStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step(&self, step_id: &str) -> Option<&RunbookStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

/// Which script a step runs, with optional profile and argument overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    /// Script id in the catalog.
    pub script: String,
    #[serde(default)]
    pub profile: Option<String>,
    /// Replaces the profile's argument string when non-empty.
    #[serde(default)]
    pub args: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookStep {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub executable: ScriptRef,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Evaluated once when the step becomes ready; `false` skips the step.
    #[serde(default)]
    pub condition: Option<StepCondition>,
}

impl RunbookStep {
    pub fn new(id: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            executable: ScriptRef {
                script: script.into(),
                profile: None,
                args: None,
            },
            depends_on: Vec::new(),
            retry: None,
            timeout_ms: None,
            condition: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.executable.profile = Some(profile.into());
        self
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.executable.args = Some(args.into());
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.as_ref().map(|r| r.max_attempts.max(1)).unwrap_or(1)
    }
}
