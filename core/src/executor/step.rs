use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::runbook::{Backoff, RunbookStep};
use crate::runner::{CancelReason, CancelSignal};
use crate::script::{RunStatus, ScriptService};
use crate::state::StepStatus;

use super::record::ExecutionRecord;

/// Runs one step: skip condition, attempts with backoff, per-attempt timeout.
///
/// Failures are recorded on the step and returned as a status; nothing
/// escapes to the caller as an error.
pub struct StepExecutor {
    scripts: Arc<ScriptService>,
}

enum AttemptResult {
    Succeeded,
    Failed(String),
    Canceled,
}

impl StepExecutor {
    pub fn new(scripts: Arc<ScriptService>) -> Self {
        Self { scripts }
    }

    pub fn scripts(&self) -> &Arc<ScriptService> {
        &self.scripts
    }

    /// Returns the step's terminal status, or `None` if the execution was
    /// cancelled before the step started (the record stays `Pending`).
    pub async fn run(
        &self,
        step: &RunbookStep,
        completed: &HashMap<String, StepStatus>,
        record: &ExecutionRecord,
        cancel: CancelSignal,
    ) -> Option<StepStatus> {
        if cancel.is_cancelled() {
            return None;
        }

        if let Some(condition) = &step.condition {
            if !condition.evaluate(completed) {
                tracing::info!(
                    execution_id = %record.id(),
                    step_id = %step.id,
                    condition = %condition,
                    "step skipped"
                );
                let now = Utc::now();
                let reason = format!("condition not met: {condition}");
                self.write(record, &step.id, |s| {
                    s.status = StepStatus::Skipped;
                    s.ended_at = Some(now);
                    s.output = Some(reason);
                })
                .await;
                return Some(StepStatus::Skipped);
            }
        }

        let max_attempts = step.max_attempts();
        let backoff = step
            .retry
            .as_ref()
            .map(|r| r.backoff.clone())
            .unwrap_or(Backoff::None);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            self.write(record, &step.id, |s| {
                s.status = StepStatus::Running;
                s.attempt = attempt;
                if s.started_at.is_none() {
                    s.started_at = Some(Utc::now());
                }
            })
            .await;

            tracing::info!(
                execution_id = %record.id(),
                step_id = %step.id,
                attempt,
                max_attempts,
                "step attempt starting"
            );

            match self.attempt(step, record, &cancel).await {
                AttemptResult::Succeeded => {
                    return Some(StepStatus::Succeeded);
                }
                AttemptResult::Canceled => {
                    last_error = "canceled".to_string();
                    break;
                }
                AttemptResult::Failed(message) => {
                    tracing::warn!(
                        execution_id = %record.id(),
                        step_id = %step.id,
                        attempt,
                        error = %message,
                        "step attempt failed"
                    );
                    last_error = message;
                }
            }

            if attempt < max_attempts {
                let delay = backoff.delay(attempt);
                let message = last_error.clone();
                self.write(record, &step.id, |s| s.error_message = Some(message))
                    .await;

                if !sleep_or_cancel(delay, &cancel).await {
                    last_error = "canceled".to_string();
                    break;
                }
            }
        }

        let now = Utc::now();
        self.write(record, &step.id, |s| {
            s.status = StepStatus::Failed;
            s.ended_at = Some(now);
            s.error_message = Some(last_error);
        })
        .await;
        Some(StepStatus::Failed)
    }

    async fn attempt(
        &self,
        step: &RunbookStep,
        record: &ExecutionRecord,
        cancel: &CancelSignal,
    ) -> AttemptResult {
        let linked = cancel.linked(step.timeout());
        let result = self
            .scripts
            .execute(&step.executable, linked.signal())
            .await;
        let timed_out =
            linked.signal().reason() == Some(CancelReason::TimedOut) && !cancel.is_cancelled();
        drop(linked);

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                if cancel.is_cancelled() {
                    return AttemptResult::Canceled;
                }
                return AttemptResult::Failed(e.to_string());
            }
        };

        let run_id = summary.run_id.clone();
        match summary.status {
            RunStatus::Succeeded => {
                let now = Utc::now();
                let output = summary.stdout_preview.clone();
                self.write(record, &step.id, |s| {
                    s.status = StepStatus::Succeeded;
                    s.run_id = Some(run_id);
                    s.ended_at = Some(now);
                    s.error_message = None;
                    s.output = output;
                })
                .await;
                AttemptResult::Succeeded
            }
            RunStatus::Canceled if !timed_out => {
                self.write(record, &step.id, |s| s.run_id = Some(run_id)).await;
                AttemptResult::Canceled
            }
            RunStatus::Canceled => {
                self.write(record, &step.id, |s| s.run_id = Some(run_id)).await;
                let limit = step.timeout().unwrap_or_default();
                AttemptResult::Failed(format!("timed out after {}", format_duration(limit)))
            }
            RunStatus::Failed => {
                let output = summary.stdout_preview.clone();
                self.write(record, &step.id, |s| {
                    s.run_id = Some(run_id);
                    s.output = output;
                })
                .await;
                AttemptResult::Failed(summary.failure_reason())
            }
        }
    }

    async fn write<F>(&self, record: &ExecutionRecord, step_id: &str, f: F)
    where
        F: FnOnce(&mut crate::state::StepExecution),
    {
        if let Err(e) = record.update_step(step_id, f).await {
            tracing::error!(
                execution_id = %record.id(),
                step_id = %step_id,
                error = %e,
                "failed to record step update"
            );
        }
    }
}

/// `false` if cancellation cut the sleep short.
async fn sleep_or_cancel(delay: Duration, cancel: &CancelSignal) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
