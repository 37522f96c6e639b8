use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{ExecutorError, StoreError};
use crate::notify::NotificationSink;
use crate::state::{
    ExecutionEvent, ExecutionStatus, RunbookExecution, StateTransition, StepExecution, StepStatus,
};
use crate::store::ExecutionStore;

/// Single writer for one execution's records.
///
/// Every mutation is written to the store, then applied in memory and only
/// then published, all while holding the record lock. A failed write leaves
/// the in-memory record untouched, so memory never runs ahead of the store.
#[derive(Clone)]
pub struct ExecutionRecord {
    inner: Arc<RecordInner>,
}

struct RecordInner {
    execution_id: String,
    state: Mutex<RunbookExecution>,
    store: Arc<dyn ExecutionStore>,
    sink: Arc<dyn NotificationSink>,
}

impl ExecutionRecord {
    /// Persist the initial record and announce it.
    pub async fn create(
        store: Arc<dyn ExecutionStore>,
        sink: Arc<dyn NotificationSink>,
        execution: RunbookExecution,
    ) -> Result<Self, StoreError> {
        store.upsert_execution(&execution).await?;
        sink.notify(&ExecutionEvent::ExecutionCreated {
            execution_id: execution.id.clone(),
            runbook_id: execution.runbook_id.clone(),
            timestamp: Utc::now(),
        });

        Ok(Self {
            inner: Arc::new(RecordInner {
                execution_id: execution.id.clone(),
                state: Mutex::new(execution),
                store,
                sink,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.execution_id
    }

    pub async fn snapshot(&self) -> RunbookExecution {
        self.inner.state.lock().await.clone()
    }

    pub async fn status(&self) -> ExecutionStatus {
        self.inner.state.lock().await.status
    }

    pub async fn step_statuses(&self) -> Vec<StepStatus> {
        self.inner
            .state
            .lock()
            .await
            .steps
            .iter()
            .map(|s| s.status)
            .collect()
    }

    /// Apply `f` to one step record, validating any status change.
    pub async fn update_step<F>(&self, step_id: &str, f: F) -> Result<StepExecution, ExecutorError>
    where
        F: FnOnce(&mut StepExecution),
    {
        let mut state = self.inner.state.lock().await;
        let slot = state
            .step_mut(step_id)
            .ok_or_else(|| ExecutorError::Internal(format!("unknown step '{step_id}'")))?;

        let before = slot.clone();
        let mut next = slot.clone();
        f(&mut next);
        if next.status != before.status {
            StateTransition::validate_step(before.status, next.status)
                .map_err(|e| ExecutorError::Internal(format!("step '{step_id}': {e}")))?;
        }

        self.inner
            .store
            .upsert_step(&self.inner.execution_id, &next)
            .await?;
        *slot = next.clone();

        if next.status != before.status || next.attempt != before.attempt {
            self.inner.sink.notify(&ExecutionEvent::StepStatusChanged {
                execution_id: self.inner.execution_id.clone(),
                step_id: next.step_id.clone(),
                status: next.status,
                attempt: next.attempt,
                timestamp: Utc::now(),
            });
        }
        if next.status != before.status && next.status.is_terminal() {
            self.inner.sink.notify(&ExecutionEvent::StepCompleted {
                execution_id: self.inner.execution_id.clone(),
                step_id: next.step_id.clone(),
                status: next.status,
                attempt: next.attempt,
                run_id: next.run_id.clone(),
                duration_ms: next.duration_ms(),
                error_message: next.error_message.clone(),
                timestamp: Utc::now(),
            });
        }

        Ok(next)
    }

    /// Move to `to` only if the current status is `expected`. `on_applied`
    /// runs under the record lock once the change is persisted.
    pub async fn transition_if<F>(
        &self,
        expected: ExecutionStatus,
        to: ExecutionStatus,
        on_applied: F,
    ) -> Result<bool, ExecutorError>
    where
        F: FnOnce(),
    {
        let mut state = self.inner.state.lock().await;
        if state.status != expected {
            return Ok(false);
        }
        self.apply_status(&mut state, to, None).await?;
        on_applied();
        Ok(true)
    }

    /// Settle the execution. No-op (returns `false`) if already terminal.
    pub async fn finish(
        &self,
        to: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<bool, ExecutorError> {
        let mut state = self.inner.state.lock().await;
        if state.status.is_terminal() {
            return Ok(false);
        }
        self.apply_status(&mut state, to, error_message).await?;
        Ok(true)
    }

    async fn apply_status(
        &self,
        state: &mut RunbookExecution,
        to: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<(), ExecutorError> {
        let from = state.status;
        StateTransition::validate_execution(from, to)
            .map_err(|e| ExecutorError::Internal(e.to_string()))?;

        let mut next = state.clone();
        next.status = to;
        if to.is_terminal() {
            next.ended_at = Some(Utc::now());
        }
        if error_message.is_some() {
            next.error_message = error_message;
        }

        // Memory only moves once the store has the same record.
        self.inner.store.upsert_execution(&next).await?;
        *state = next;

        self.inner.sink.notify(&ExecutionEvent::ExecutionStatusChanged {
            execution_id: state.id.clone(),
            old_status: from,
            new_status: to,
            error_message: state.error_message.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
