#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use opsbook_core::error::{RunnerError, StoreError};
use opsbook_core::executor::ExecutionManager;
use opsbook_core::runner::{
    CancelSignal, LaunchOutcome, LaunchSpec, LineStream, LineTap, ProcessLauncher,
};
use opsbook_core::script::{
    Artifact, RunSummary, ScriptDefinition, ScriptService, StaticScriptCatalog,
};
use opsbook_core::state::{RunbookExecution, StepExecution};
use opsbook_core::store::{ExecutionStore, MemoryStore};

/// What one fake invocation does.
#[derive(Debug, Clone)]
pub struct FakeRun {
    pub delay: Duration,
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// File written into `$OPSBOOK_RUN_DIR`.
    pub artifact: Option<(String, String)>,
    pub spawn_error: bool,
    pub panic: bool,
}

impl FakeRun {
    pub fn ok(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            exit_code: 0,
            stdout: vec!["done".into()],
            stderr: Vec::new(),
            artifact: None,
            spawn_error: false,
            panic: false,
        }
    }

    pub fn fail(delay_ms: u64, exit_code: i32, stderr: &str) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            exit_code,
            stdout: Vec::new(),
            stderr: stderr.lines().map(str::to_string).collect(),
            artifact: None,
            spawn_error: false,
            panic: false,
        }
    }

    pub fn spawn_error() -> Self {
        Self {
            spawn_error: true,
            ..Self::ok(0)
        }
    }

    /// The launcher panics instead of returning.
    pub fn panics() -> Self {
        Self {
            panic: true,
            ..Self::ok(0)
        }
    }

    pub fn with_artifact(mut self, name: &str, content: &str) -> Self {
        self.artifact = Some((name.into(), content.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub script: String,
    pub args: String,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub started: Instant,
    pub ended: Instant,
    pub canceled: bool,
}

/// In-process launcher with scripted outcomes per script file stem.
///
/// Each script consumes its queue in order; the last entry repeats.
#[derive(Default)]
pub struct FakeLauncher {
    plans: Mutex<HashMap<String, Vec<FakeRun>>>,
    calls: Mutex<Vec<Call>>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn plan(&self, script: &str, runs: Vec<FakeRun>) {
        self.plans.lock().unwrap().insert(script.to_string(), runs);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, script: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.script == script)
            .collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_run(&self, script: &str) -> FakeRun {
        let mut plans = self.plans.lock().unwrap();
        let queue = plans.entry(script.to_string()).or_default();
        match queue.len() {
            0 => FakeRun::ok(10),
            1 => queue[0].clone(),
            _ => queue.remove(0),
        }
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(
        &self,
        spec: &LaunchSpec,
        line_tx: mpsc::Sender<LineTap>,
        cancel: CancelSignal,
    ) -> Result<LaunchOutcome, RunnerError> {
        let script = spec
            .script
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let run = self.next_run(&script);
        let started = Instant::now();
        if run.spawn_error {
            return Err(RunnerError::Spawn(format!("cannot start {script}")));
        }
        if run.panic {
            panic!("launcher blew up running {script}");
        }

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        for line in &run.stdout {
            let _ = line_tx
                .send(LineTap {
                    line: line.clone(),
                    stream: LineStream::Stdout,
                })
                .await;
        }
        for line in &run.stderr {
            let _ = line_tx
                .send(LineTap {
                    line: line.clone(),
                    stream: LineStream::Stderr,
                })
                .await;
        }
        if let Some((name, content)) = &run.artifact {
            if let Some(dir) = spec.env.get("OPSBOOK_RUN_DIR") {
                std::fs::write(Path::new(dir).join(name), content)
                    .map_err(|e| RunnerError::Spawn(e.to_string()))?;
            }
        }
        drop(line_tx);

        let canceled = tokio::select! {
            _ = tokio::time::sleep(run.delay) => false,
            _ = cancel.cancelled() => true,
        };
        self.current.fetch_sub(1, Ordering::SeqCst);

        self.calls.lock().unwrap().push(Call {
            script,
            args: spec.args.clone(),
            working_dir: spec.working_dir.clone(),
            env: spec.env.clone(),
            started,
            ended: Instant::now(),
            canceled,
        });

        let command_line = spec.script.to_string_lossy().to_string();
        if canceled {
            Ok(LaunchOutcome::canceled(command_line))
        } else {
            Ok(LaunchOutcome::exited(run.exit_code, command_line))
        }
    }
}

pub struct Harness {
    pub manager: ExecutionManager,
    pub store: Arc<MemoryStore>,
    pub launcher: Arc<FakeLauncher>,
    pub scripts: Arc<ScriptService>,
    pub runs_dir: tempfile::TempDir,
}

/// Manager over a memory store with one fake script per id in `scripts`.
pub fn harness(scripts: &[&str]) -> Harness {
    harness_with(scripts, None)
}

pub fn harness_with(scripts: &[&str], max_parallel_steps: Option<usize>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    build_harness(scripts, max_parallel_steps, store.clone(), store)
}

/// Like [`harness`], but the manager writes through `backing`. `store` must
/// observe the same data so tests can inspect what was persisted.
pub fn harness_over(
    scripts: &[&str],
    store: Arc<MemoryStore>,
    backing: Arc<dyn ExecutionStore>,
) -> Harness {
    build_harness(scripts, None, store, backing)
}

fn build_harness(
    scripts: &[&str],
    max_parallel_steps: Option<usize>,
    store: Arc<MemoryStore>,
    backing: Arc<dyn ExecutionStore>,
) -> Harness {
    let launcher = FakeLauncher::new();
    let runs_dir = tempfile::tempdir().unwrap();
    let catalog = StaticScriptCatalog::new(
        scripts
            .iter()
            .map(|id| ScriptDefinition::new(*id, format!("/fake/{id}.sh"))),
    );
    let service = Arc::new(ScriptService::new(
        Arc::new(catalog),
        launcher.clone(),
        backing.clone(),
        runs_dir.path(),
    ));
    let manager = ExecutionManager::builder(backing, service.clone())
        .max_parallel_steps(max_parallel_steps)
        .build();
    Harness {
        manager,
        store,
        launcher,
        scripts: service,
        runs_dir,
    }
}

/// Memory store whose terminal execution writes fail a set number of times.
pub struct FlakyStore {
    inner: MemoryStore,
    terminal_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, terminal_failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            terminal_failures: AtomicUsize::new(terminal_failures),
        })
    }
}

#[async_trait]
impl ExecutionStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn upsert_execution(&self, execution: &RunbookExecution) -> Result<(), StoreError> {
        if execution.status.is_terminal()
            && self
                .terminal_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk unavailable",
            )));
        }
        self.inner.upsert_execution(execution).await
    }

    async fn upsert_step(&self, execution_id: &str, step: &StepExecution) -> Result<(), StoreError> {
        self.inner.upsert_step(execution_id, step).await
    }

    async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<RunbookExecution>, StoreError> {
        self.inner.get_execution(execution_id).await
    }

    async fn list_executions(&self) -> Result<Vec<RunbookExecution>, StoreError> {
        self.inner.list_executions().await
    }

    async fn append_run(&self, summary: &RunSummary) -> Result<(), StoreError> {
        self.inner.append_run(summary).await
    }

    async fn append_artifacts(&self, artifacts: &[Artifact]) -> Result<(), StoreError> {
        self.inner.append_artifacts(artifacts).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunSummary>, StoreError> {
        self.inner.get_run(run_id).await
    }

    async fn artifacts_for_run(&self, run_id: &str) -> Result<Vec<Artifact>, StoreError> {
        self.inner.artifacts_for_run(run_id).await
    }

    async fn runs_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<RunSummary>, StoreError> {
        self.inner.runs_by_fingerprint(fingerprint).await
    }
}

/// Poll until `check` holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
