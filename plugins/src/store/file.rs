//! Directory-backed store.
//!
//! ```text
//! <dir>/executions/<execution_id>.json   one document per execution
//! <dir>/runs.jsonl                       append-only run summaries
//! <dir>/artifacts.jsonl                  append-only artifact records
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use opsbook_core::error::StoreError;
use opsbook_core::script::{Artifact, RunSummary};
use opsbook_core::state::{RunbookExecution, StepExecution};
use opsbook_core::store::ExecutionStore;

pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes read-modify-write of execution documents and appends.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(dir.join("executions")).await?;
        tracing::debug!(dir = %dir.display(), "file store opened");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn execution_path(&self, execution_id: &str) -> PathBuf {
        self.dir
            .join("executions")
            .join(format!("{}.json", sanitize_id(execution_id)))
    }

    fn runs_path(&self) -> PathBuf {
        self.dir.join("runs.jsonl")
    }

    fn artifacts_path(&self) -> PathBuf {
        self.dir.join("artifacts.jsonl")
    }

    async fn read_execution(&self, execution_id: &str) -> Result<Option<RunbookExecution>, StoreError> {
        match tokio::fs::read(self.execution_path(execution_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file then rename, so readers never see a torn document.
    async fn write_execution(&self, execution: &RunbookExecution) -> Result<(), StoreError> {
        let path = self.execution_path(&execution.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(execution)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn append_lines<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Read every record of a JSONL file. Unparseable lines are skipped with a warning.
async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => out.push(record),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = idx + 1,
                error = %e,
                "skipping corrupt store line"
            ),
        }
    }
    Ok(out)
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl ExecutionStore for JsonFileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn upsert_execution(&self, execution: &RunbookExecution) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_execution(execution).await
    }

    async fn upsert_step(
        &self,
        execution_id: &str,
        step: &StepExecution,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut execution = self
            .read_execution(execution_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        match execution.step_mut(&step.step_id) {
            Some(slot) => *slot = step.clone(),
            None => execution.steps.push(step.clone()),
        }
        self.write_execution(&execution).await
    }

    async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<RunbookExecution>, StoreError> {
        self.read_execution(execution_id).await
    }

    async fn list_executions(&self) -> Result<Vec<RunbookExecution>, StoreError> {
        let mut entries = tokio::fs::read_dir(self.dir.join("executions")).await?;
        let mut all = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<RunbookExecution>(&bytes) {
                Ok(execution) => all.push(execution),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt execution file")
                }
            }
        }
        all.sort_by_key(|e| e.started_at);
        Ok(all)
    }

    async fn append_run(&self, summary: &RunSummary) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.append_lines(&self.runs_path(), std::slice::from_ref(summary))
            .await
    }

    async fn append_artifacts(&self, artifacts: &[Artifact]) -> Result<(), StoreError> {
        if artifacts.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        self.append_lines(&self.artifacts_path(), artifacts).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunSummary>, StoreError> {
        let runs: Vec<RunSummary> = read_lines(&self.runs_path()).await?;
        Ok(runs.into_iter().find(|r| r.run_id == run_id))
    }

    async fn artifacts_for_run(&self, run_id: &str) -> Result<Vec<Artifact>, StoreError> {
        let artifacts: Vec<Artifact> = read_lines(&self.artifacts_path()).await?;
        Ok(artifacts.into_iter().filter(|a| a.run_id == run_id).collect())
    }

    async fn runs_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<RunSummary>, StoreError> {
        let runs: Vec<RunSummary> = read_lines(&self.runs_path()).await?;
        Ok(runs
            .into_iter()
            .filter(|r| r.failure_fingerprint.as_deref() == Some(fingerprint))
            .collect())
    }
}
