use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinError;

use crate::error::ExecutorError;
use crate::runbook::{Runbook, StepGraph};
use crate::runner::CancelSignal;
use crate::state::{classify, ExecutionStatus, StepStatus};

use super::control::PauseGate;
use super::record::ExecutionRecord;
use super::step::StepExecutor;

type Completed = Arc<Mutex<HashMap<String, StepStatus>>>;

/// Drives one execution: starts each step as soon as its dependencies have
/// settled, honours pause and cancel, then settles the overall status.
pub struct Coordinator {
    runbook: Arc<Runbook>,
    record: ExecutionRecord,
    steps: Arc<StepExecutor>,
    cancel: CancelSignal,
    pause: PauseGate,
    limiter: Option<Arc<Semaphore>>,
}

impl Coordinator {
    pub fn new(
        runbook: Arc<Runbook>,
        record: ExecutionRecord,
        steps: Arc<StepExecutor>,
        cancel: CancelSignal,
        pause: PauseGate,
        max_parallel_steps: Option<usize>,
    ) -> Self {
        Self {
            runbook,
            record,
            steps,
            cancel,
            pause,
            limiter: max_parallel_steps.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    pub async fn run(mut self) -> Result<ExecutionStatus, ExecutorError> {
        let execution_id = self.record.id().to_string();
        let order = StepGraph::from_runbook(&self.runbook)
            .topological_order()
            .ok_or_else(|| ExecutorError::Internal("runbook steps are not orderable".into()))?;

        let total = self.runbook.steps.len();
        let completed: Completed = Arc::new(Mutex::new(HashMap::new()));
        let mut running: HashSet<String> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();
        let mut canceled = false;

        tracing::info!(execution_id = %execution_id, steps = total, "execution scheduling started");

        loop {
            if self.cancel.is_cancelled() {
                canceled = true;
                break;
            }

            let settled = completed.lock().await.clone();
            if settled.len() >= total {
                break;
            }

            if self.pause.is_paused() {
                tracing::debug!(execution_id = %execution_id, "scheduling paused");
                tokio::select! {
                    _ = self.pause.wait_resumed() => {}
                    _ = self.cancel.cancelled() => {
                        canceled = true;
                        break;
                    }
                    Some((step_id, joined)) = in_flight.next(), if !in_flight.is_empty() => {
                        self.reap(&completed, &mut running, step_id, joined).await;
                    }
                }
                continue;
            }

            let ready: Vec<_> = order
                .iter()
                .filter_map(|id| self.runbook.step(id))
                .filter(|s| {
                    !settled.contains_key(&s.id)
                        && !running.contains(&s.id)
                        && s.depends_on.iter().all(|d| settled.contains_key(d))
                })
                .cloned()
                .collect();

            if ready.is_empty() && running.is_empty() {
                let unreached: Vec<&str> = order
                    .iter()
                    .filter(|id| !settled.contains_key(*id))
                    .map(String::as_str)
                    .collect();
                tracing::warn!(
                    execution_id = %execution_id,
                    unreached = ?unreached,
                    "no runnable steps remain"
                );
                break;
            }

            for step in ready {
                let step_id = step.id.clone();
                running.insert(step_id.clone());

                let steps = self.steps.clone();
                let record = self.record.clone();
                let cancel = self.cancel.clone();
                let limiter = self.limiter.clone();
                let mut pause = self.pause.clone();
                let completed = completed.clone();
                let handle = tokio::spawn(async move {
                    let _permit = match limiter {
                        Some(sem) => tokio::select! {
                            permit = sem.acquire_owned() => permit.ok(),
                            _ = cancel.cancelled() => return None,
                        },
                        None => None,
                    };
                    // A permit can free up after a pause was requested.
                    if pause.is_paused() {
                        tokio::select! {
                            _ = pause.wait_resumed() => {}
                            _ = cancel.cancelled() => return None,
                        }
                    }
                    let snapshot = completed.lock().await.clone();
                    let status = steps.run(&step, &snapshot, &record, cancel).await;
                    if let Some(status) = status {
                        completed.lock().await.insert(step.id.clone(), status);
                    }
                    status
                });
                in_flight.push(async move { (step_id, handle.await) });
            }

            // At least one unit must finish before re-evaluating readiness.
            tokio::select! {
                Some((step_id, joined)) = in_flight.next() => {
                    self.reap(&completed, &mut running, step_id, joined).await;
                }
                _ = self.cancel.cancelled() => {
                    canceled = true;
                    break;
                }
            }
            while let Some(Some((step_id, joined))) = in_flight.next().now_or_never() {
                self.reap(&completed, &mut running, step_id, joined).await;
            }
        }

        // In-flight steps observe the same cancel signal and unwind on their own.
        while let Some((step_id, joined)) = in_flight.next().await {
            self.reap(&completed, &mut running, step_id, joined).await;
        }

        canceled |= self.cancel.is_cancelled();
        let (status, message) = if canceled {
            (ExecutionStatus::Canceled, Some("execution canceled".to_string()))
        } else {
            let snapshot = self.record.snapshot().await;
            let statuses: Vec<StepStatus> = snapshot.steps.iter().map(|s| s.status).collect();
            let status = classify(&statuses);
            (status, failure_message(status, &snapshot.steps))
        };

        self.record.finish(status, message).await?;
        tracing::info!(execution_id = %execution_id, status = %status, "execution finished");
        Ok(status)
    }

    async fn reap(
        &self,
        completed: &Completed,
        running: &mut HashSet<String>,
        step_id: String,
        joined: Result<Option<StepStatus>, JoinError>,
    ) {
        running.remove(&step_id);
        let Err(e) = joined else {
            return;
        };

        tracing::error!(
            execution_id = %self.record.id(),
            step_id = %step_id,
            error = %e,
            "step unit crashed"
        );
        let message = format!("step unit crashed: {e}");
        let result = self
            .record
            .update_step(&step_id, |s| {
                s.status = StepStatus::Failed;
                s.ended_at = Some(chrono::Utc::now());
                s.error_message = Some(message);
            })
            .await;
        if let Err(e) = result {
            tracing::error!(step_id = %step_id, error = %e, "failed to record crashed step");
        }
        completed.lock().await.insert(step_id, StepStatus::Failed);
    }
}

fn failure_message(
    status: ExecutionStatus,
    steps: &[crate::state::StepExecution],
) -> Option<String> {
    match status {
        ExecutionStatus::Succeeded => None,
        ExecutionStatus::PartialSuccess | ExecutionStatus::Failed => {
            let failed: Vec<&str> = steps
                .iter()
                .filter(|s| s.status == StepStatus::Failed)
                .map(|s| s.step_id.as_str())
                .collect();
            let unreached: Vec<&str> = steps
                .iter()
                .filter(|s| !s.status.is_terminal())
                .map(|s| s.step_id.as_str())
                .collect();
            let mut parts = Vec::new();
            if !failed.is_empty() {
                parts.push(format!("failed steps: {}", failed.join(", ")));
            }
            if !unreached.is_empty() {
                parts.push(format!("never reached: {}", unreached.join(", ")));
            }
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        ExecutionStatus::Canceled => Some("execution canceled".to_string()),
        ExecutionStatus::Running | ExecutionStatus::Paused => None,
    }
}
