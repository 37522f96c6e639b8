use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::script::{Artifact, RunSummary};
use crate::state::{RunbookExecution, StepExecution};

use super::ExecutionStore;

/// Process-local store. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    executions: RwLock<HashMap<String, RunbookExecution>>,
    runs: RwLock<Vec<RunSummary>>,
    artifacts: RwLock<Vec<Artifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert_execution(&self, execution: &RunbookExecution) -> Result<(), StoreError> {
        self.inner
            .executions
            .write()
            .await
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn upsert_step(
        &self,
        execution_id: &str,
        step: &StepExecution,
    ) -> Result<(), StoreError> {
        let mut executions = self.inner.executions.write().await;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        match execution.step_mut(&step.step_id) {
            Some(slot) => *slot = step.clone(),
            None => execution.steps.push(step.clone()),
        }
        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<RunbookExecution>, StoreError> {
        Ok(self.inner.executions.read().await.get(execution_id).cloned())
    }

    async fn list_executions(&self) -> Result<Vec<RunbookExecution>, StoreError> {
        let mut all: Vec<_> = self.inner.executions.read().await.values().cloned().collect();
        all.sort_by_key(|e| e.started_at);
        Ok(all)
    }

    async fn append_run(&self, summary: &RunSummary) -> Result<(), StoreError> {
        self.inner.runs.write().await.push(summary.clone());
        Ok(())
    }

    async fn append_artifacts(&self, artifacts: &[Artifact]) -> Result<(), StoreError> {
        self.inner
            .artifacts
            .write()
            .await
            .extend_from_slice(artifacts);
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunSummary>, StoreError> {
        Ok(self
            .inner
            .runs
            .read()
            .await
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned())
    }

    async fn artifacts_for_run(&self, run_id: &str) -> Result<Vec<Artifact>, StoreError> {
        Ok(self
            .inner
            .artifacts
            .read()
            .await
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn runs_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<RunSummary>, StoreError> {
        Ok(self
            .inner
            .runs
            .read()
            .await
            .iter()
            .filter(|r| r.failure_fingerprint.as_deref() == Some(fingerprint))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runbook::{Runbook, RunbookStep};
    use crate::state::StepStatus;

    #[tokio::test]
    async fn upsert_step_replaces_record_in_place() {
        let store = MemoryStore::new();
        let runbook = Runbook::new("rb", "rb")
            .with_step(RunbookStep::new("a", "s"))
            .with_step(RunbookStep::new("b", "s"));
        let exec = RunbookExecution::new("e1", &runbook, None);
        store.upsert_execution(&exec).await.unwrap();

        let mut step = exec.steps[1].clone();
        step.status = StepStatus::Running;
        step.attempt = 1;
        store.upsert_step("e1", &step).await.unwrap();

        let loaded = store.get_execution("e1").await.unwrap().unwrap();
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.step("b").unwrap().status, StepStatus::Running);
        assert_eq!(loaded.step("a").unwrap().status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn upsert_step_for_unknown_execution_fails() {
        let store = MemoryStore::new();
        let err = store
            .upsert_step("missing", &StepExecution::pending("a", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "missing"));
    }
}
