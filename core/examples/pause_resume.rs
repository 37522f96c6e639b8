//! Drive a small diamond runbook through pause, resume and completion with
//! an in-process launcher, printing every execution event.
//!
//! Run with: cargo run -p opsbook-core --example pause_resume

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use opsbook_core::error::RunnerError;
use opsbook_core::executor::ExecutionManager;
use opsbook_core::runbook::{Backoff, RetryPolicy, Runbook, RunbookStep};
use opsbook_core::runner::{
    CancelSignal, LaunchOutcome, LaunchSpec, LineStream, LineTap, ProcessLauncher,
};
use opsbook_core::script::{ScriptDefinition, ScriptService, StaticScriptCatalog};
use opsbook_core::state::ExecutionEvent;
use opsbook_core::store::MemoryStore;

/// Sleeps instead of spawning. Scripts named `flaky` fail their first run.
struct SleepLauncher {
    flaky_runs: std::sync::atomic::AtomicU32,
}

#[async_trait]
impl ProcessLauncher for SleepLauncher {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn run(
        &self,
        spec: &LaunchSpec,
        line_tx: mpsc::Sender<LineTap>,
        cancel: CancelSignal,
    ) -> Result<LaunchOutcome, RunnerError> {
        let command_line = spec.script.display().to_string();
        let _ = line_tx
            .send(LineTap {
                line: format!("running {command_line} {}", spec.args),
                stream: LineStream::Stdout,
            })
            .await;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(300)) => {}
            _ = cancel.cancelled() => return Ok(LaunchOutcome::canceled(command_line)),
        }

        let flaky = spec.script.ends_with("flaky.sh");
        if flaky
            && self
                .flaky_runs
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                == 0
        {
            let _ = line_tx
                .send(LineTap {
                    line: "connection reset by peer".into(),
                    stream: LineStream::Stderr,
                })
                .await;
            return Ok(LaunchOutcome::exited(1, command_line));
        }
        Ok(LaunchOutcome::exited(0, command_line))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let runs_dir = tempfile::tempdir()?;
    let store = Arc::new(MemoryStore::new());
    let catalog = StaticScriptCatalog::new(
        ["prepare", "flaky", "build", "publish"]
            .into_iter()
            .map(|id| ScriptDefinition::new(id, format!("/demo/{id}.sh"))),
    );
    let scripts = Arc::new(ScriptService::new(
        Arc::new(catalog),
        Arc::new(SleepLauncher {
            flaky_runs: Default::default(),
        }),
        store.clone(),
        runs_dir.path(),
    ));
    let manager = ExecutionManager::new(store, scripts);

    let runbook = Runbook::new("release", "Release pipeline")
        .with_step(RunbookStep::new("prepare", "prepare"))
        .with_step(
            RunbookStep::new("tests", "flaky")
                .depends_on(["prepare"])
                .with_retry(RetryPolicy::new(3, Backoff::Fixed { delay_ms: 200 })),
        )
        .with_step(RunbookStep::new("build", "build").depends_on(["prepare"]))
        .with_step(RunbookStep::new("publish", "publish").depends_on(["tests", "build"]));

    let mut events = manager.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                ExecutionEvent::StepStatusChanged {
                    step_id,
                    status,
                    attempt,
                    ..
                } => println!("  step {step_id} -> {} (attempt {attempt})", status.as_str()),
                ExecutionEvent::StepCompleted {
                    step_id,
                    status,
                    error_message,
                    ..
                } => println!(
                    "  step {step_id} settled {} {}",
                    status.as_str(),
                    error_message.as_deref().unwrap_or("")
                ),
                ExecutionEvent::ExecutionStatusChanged { new_status, .. } => {
                    println!("execution -> {new_status}");
                    if new_status.is_terminal() {
                        break;
                    }
                }
                ExecutionEvent::ExecutionCreated { execution_id, .. } => {
                    println!("execution {execution_id} created")
                }
            }
        }
    });

    let id = manager.execute(runbook, Some("demo".into())).await?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("pause accepted: {}", manager.pause(&id).await?);
    tokio::time::sleep(Duration::from_millis(800)).await;
    if let Some(info) = manager.get_info(&id).await? {
        println!("while paused: {}", info.status);
    }
    println!("resume accepted: {}", manager.resume(&id).await?);

    let finished = manager.wait(&id).await?;
    printer.await?;
    println!("final status: {}", finished.status);
    Ok(())
}
