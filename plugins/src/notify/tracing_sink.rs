use opsbook_core::notify::NotificationSink;
use opsbook_core::state::{ExecutionEvent, ExecutionStatus, StepStatus};

/// Mirrors execution events into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn notify(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::ExecutionCreated {
                execution_id,
                runbook_id,
                ..
            } => {
                tracing::info!(execution_id = %execution_id, runbook_id = %runbook_id, "execution created");
            }
            ExecutionEvent::ExecutionStatusChanged {
                execution_id,
                old_status,
                new_status,
                error_message,
                ..
            } => match new_status {
                ExecutionStatus::Failed => tracing::warn!(
                    execution_id = %execution_id,
                    from = %old_status,
                    error = error_message.as_deref().unwrap_or(""),
                    "execution failed"
                ),
                _ => tracing::info!(
                    execution_id = %execution_id,
                    from = %old_status,
                    to = %new_status,
                    "execution status changed"
                ),
            },
            ExecutionEvent::StepStatusChanged {
                execution_id,
                step_id,
                status,
                attempt,
                ..
            } => {
                tracing::debug!(
                    execution_id = %execution_id,
                    step_id = %step_id,
                    status = %status,
                    attempt = *attempt,
                    "step status changed"
                );
            }
            ExecutionEvent::StepCompleted {
                execution_id,
                step_id,
                status,
                attempt,
                run_id,
                duration_ms,
                error_message,
                ..
            } => {
                if *status == StepStatus::Failed {
                    tracing::warn!(
                        execution_id = %execution_id,
                        step_id = %step_id,
                        attempt = *attempt,
                        run_id = run_id.as_deref().unwrap_or(""),
                        error = error_message.as_deref().unwrap_or(""),
                        "step failed"
                    );
                } else {
                    tracing::info!(
                        execution_id = %execution_id,
                        step_id = %step_id,
                        status = %status,
                        attempt = *attempt,
                        duration_ms = ?duration_ms,
                        "step completed"
                    );
                }
            }
        }
    }
}
