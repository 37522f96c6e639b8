//! Persistence contract for execution records, run summaries and artifacts.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::script::{Artifact, RunSummary};
use crate::state::{RunbookExecution, StepExecution};

pub use memory::MemoryStore;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    fn name(&self) -> &str;

    async fn upsert_execution(&self, execution: &RunbookExecution) -> Result<(), StoreError>;

    /// Replace one step record inside an already stored execution.
    async fn upsert_step(&self, execution_id: &str, step: &StepExecution)
        -> Result<(), StoreError>;

    async fn get_execution(&self, execution_id: &str)
        -> Result<Option<RunbookExecution>, StoreError>;

    async fn list_executions(&self) -> Result<Vec<RunbookExecution>, StoreError>;

    async fn append_run(&self, summary: &RunSummary) -> Result<(), StoreError>;

    async fn append_artifacts(&self, artifacts: &[Artifact]) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunSummary>, StoreError>;

    async fn artifacts_for_run(&self, run_id: &str) -> Result<Vec<Artifact>, StoreError>;

    /// Every stored run that failed with this fingerprint, oldest first.
    async fn runs_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<RunSummary>, StoreError>;
}
