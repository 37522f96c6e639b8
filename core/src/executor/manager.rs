use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch, RwLock};

use crate::error::ExecutorError;
use crate::notify::{BroadcastSink, NotificationSink, SinkSet};
use crate::runbook::{validate, Runbook};
use crate::script::ScriptService;
use crate::state::{ExecutionEvent, ExecutionStatus, RunbookExecution};
use crate::store::ExecutionStore;

use super::control::ExecutionControl;
use super::coordinator::Coordinator;
use super::record::ExecutionRecord;
use super::step::StepExecutor;

/// Entry point for running runbooks: `execute`, `pause`, `resume`, `cancel`
/// and `get_info`, plus an event stream.
///
/// Owns the table of in-flight executions. Finished executions are served
/// from the store.
#[derive(Clone)]
pub struct ExecutionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    store: Arc<dyn ExecutionStore>,
    steps: Arc<StepExecutor>,
    events: BroadcastSink,
    sink: Arc<dyn NotificationSink>,
    max_parallel_steps: Option<usize>,
    active: RwLock<HashMap<String, ActiveExecution>>,
}

#[derive(Clone)]
struct ActiveExecution {
    record: ExecutionRecord,
    control: Arc<ExecutionControl>,
    done: watch::Receiver<bool>,
}

pub struct ExecutionManagerBuilder {
    store: Arc<dyn ExecutionStore>,
    scripts: Arc<ScriptService>,
    sinks: SinkSet,
    event_capacity: usize,
    max_parallel_steps: Option<usize>,
}

impl ExecutionManagerBuilder {
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn max_parallel_steps(mut self, limit: Option<usize>) -> Self {
        self.max_parallel_steps = limit;
        self
    }

    pub fn build(self) -> ExecutionManager {
        let events = BroadcastSink::new(self.event_capacity);
        let mut sinks = self.sinks;
        sinks.push(Arc::new(events.clone()));

        ExecutionManager {
            inner: Arc::new(ManagerInner {
                store: self.store,
                steps: Arc::new(StepExecutor::new(self.scripts)),
                events,
                sink: Arc::new(sinks),
                max_parallel_steps: self.max_parallel_steps,
                active: RwLock::new(HashMap::new()),
            }),
        }
    }
}

impl ExecutionManager {
    pub fn builder(
        store: Arc<dyn ExecutionStore>,
        scripts: Arc<ScriptService>,
    ) -> ExecutionManagerBuilder {
        ExecutionManagerBuilder {
            store,
            scripts,
            sinks: SinkSet::new(),
            event_capacity: 1000,
            max_parallel_steps: None,
        }
    }

    pub fn new(store: Arc<dyn ExecutionStore>, scripts: Arc<ScriptService>) -> Self {
        Self::builder(store, scripts).build()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.inner.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.inner.store
    }

    /// Validate, persist the initial records and start scheduling in the
    /// background. Returns without waiting for any step.
    ///
    /// An invalid runbook is recorded as a `Failed` execution carrying the
    /// validation errors and reported as [`ExecutorError::Validation`].
    pub async fn execute(
        &self,
        runbook: Runbook,
        trigger_info: Option<String>,
    ) -> Result<String, ExecutorError> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let mut execution = RunbookExecution::new(&execution_id, &runbook, trigger_info);

        let report = validate(&runbook);
        if !report.is_valid() {
            execution.status = ExecutionStatus::Failed;
            execution.ended_at = Some(Utc::now());
            execution.error_message = Some(report.errors.join("; "));
            self.inner.store.upsert_execution(&execution).await?;
            self.inner
                .sink
                .notify(&ExecutionEvent::ExecutionStatusChanged {
                    execution_id: execution_id.clone(),
                    old_status: ExecutionStatus::Running,
                    new_status: ExecutionStatus::Failed,
                    error_message: execution.error_message.clone(),
                    timestamp: Utc::now(),
                });
            tracing::warn!(
                execution_id = %execution_id,
                runbook_id = %runbook.id,
                errors = ?report.errors,
                "runbook failed validation"
            );
            return Err(ExecutorError::Validation {
                execution_id,
                runbook_id: runbook.id,
                errors: report.errors,
            });
        }

        let record =
            ExecutionRecord::create(self.inner.store.clone(), self.inner.sink.clone(), execution)
                .await?;
        let control = Arc::new(ExecutionControl::new());
        let (done_tx, done_rx) = watch::channel(false);

        self.inner.active.write().await.insert(
            execution_id.clone(),
            ActiveExecution {
                record: record.clone(),
                control: control.clone(),
                done: done_rx,
            },
        );

        let runbook_id = runbook.id.clone();
        let coordinator = Coordinator::new(
            Arc::new(runbook),
            record.clone(),
            self.inner.steps.clone(),
            control.cancel_signal(),
            control.pause_gate(),
            self.inner.max_parallel_steps,
        );

        tracing::info!(execution_id = %execution_id, runbook_id = %runbook_id, "execution started");

        let manager = self.clone();
        let id = execution_id.clone();
        tokio::spawn(async move {
            let outcome = tokio::spawn(coordinator.run()).await;
            let failure = match outcome {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("coordinator crashed: {e}")),
            };

            if let Some(message) = failure {
                tracing::error!(execution_id = %id, error = %message, "execution engine failure");
                if let Err(e) = record
                    .finish(ExecutionStatus::Failed, Some(message))
                    .await
                {
                    tracing::error!(execution_id = %id, error = %e, "failed to record engine failure");
                }
            }

            manager.inner.active.write().await.remove(&id);
            let _ = done_tx.send(true);
        });

        Ok(execution_id)
    }

    /// Pause a `Running` execution. In-flight steps keep running; no new
    /// step starts until [`resume`](Self::resume).
    pub async fn pause(&self, execution_id: &str) -> Result<bool, ExecutorError> {
        let Some(active) = self.active(execution_id).await else {
            return self.inactive(execution_id).await;
        };
        let control = active.control.clone();
        let applied = active
            .record
            .transition_if(ExecutionStatus::Running, ExecutionStatus::Paused, || {
                control.pause()
            })
            .await?;
        if applied {
            tracing::info!(execution_id = %execution_id, "execution paused");
        }
        Ok(applied)
    }

    pub async fn resume(&self, execution_id: &str) -> Result<bool, ExecutorError> {
        let Some(active) = self.active(execution_id).await else {
            return self.inactive(execution_id).await;
        };
        let control = active.control.clone();
        let applied = active
            .record
            .transition_if(ExecutionStatus::Paused, ExecutionStatus::Running, || {
                control.resume()
            })
            .await?;
        if applied {
            tracing::info!(execution_id = %execution_id, "execution resumed");
        }
        Ok(applied)
    }

    /// Request cancellation. The status becomes `Canceled` once in-flight
    /// steps have unwound; use [`wait`](Self::wait) to observe it.
    pub async fn cancel(&self, execution_id: &str) -> Result<bool, ExecutorError> {
        let Some(active) = self.active(execution_id).await else {
            return self.inactive(execution_id).await;
        };
        if active.record.status().await.is_terminal() || active.control.is_cancelled() {
            return Ok(false);
        }
        active.control.cancel();
        tracing::info!(execution_id = %execution_id, "execution cancel requested");
        Ok(true)
    }

    /// Current snapshot: live record while active, stored record afterwards.
    pub async fn get_info(
        &self,
        execution_id: &str,
    ) -> Result<Option<RunbookExecution>, ExecutorError> {
        if let Some(active) = self.active(execution_id).await {
            return Ok(Some(active.record.snapshot().await));
        }
        Ok(self.inner.store.get_execution(execution_id).await?)
    }

    /// Resolve with the final snapshot once the execution is terminal.
    pub async fn wait(&self, execution_id: &str) -> Result<RunbookExecution, ExecutorError> {
        if let Some(active) = self.active(execution_id).await {
            let mut done = active.done.clone();
            while !*done.borrow_and_update() {
                if done.changed().await.is_err() {
                    break;
                }
            }
            return Ok(active.record.snapshot().await);
        }
        self.inner
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| ExecutorError::ExecutionNotFound(execution_id.to_string()))
    }

    pub async fn active_ids(&self) -> Vec<String> {
        self.inner.active.read().await.keys().cloned().collect()
    }

    async fn active(&self, execution_id: &str) -> Option<ActiveExecution> {
        self.inner.active.read().await.get(execution_id).cloned()
    }

    /// Control calls on executions that are no longer active are no-ops.
    async fn inactive(&self, execution_id: &str) -> Result<bool, ExecutorError> {
        match self.inner.store.get_execution(execution_id).await? {
            Some(_) => Ok(false),
            None => Err(ExecutorError::ExecutionNotFound(execution_id.to_string())),
        }
    }
}
