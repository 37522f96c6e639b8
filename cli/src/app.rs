//! Command implementations: load documents, assemble the manager and render results.
use std::sync::Arc;
use std::time::Duration;

use opsbook_core::api as core_api;
use opsbook_core::executor::ExecutionManager;
use opsbook_core::runbook::{load_document, validate};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::commands::cli::{FailuresArgs, FingerprintArgs, RunArgs, ShowArgs, ValidateArgs};
use crate::progress::ProgressView;

/// Exit code reported for each terminal execution status.
pub fn exit_code_for_status(status: core_api::ExecutionStatus) -> i32 {
    match status {
        core_api::ExecutionStatus::Succeeded => 0,
        core_api::ExecutionStatus::PartialSuccess => 2,
        core_api::ExecutionStatus::Failed => 1,
        core_api::ExecutionStatus::Canceled => 130,
        core_api::ExecutionStatus::Running | core_api::ExecutionStatus::Paused => 50,
    }
}

#[tracing::instrument(name = "cli.run", skip(args, ctx), fields(file = %args.file.display()))]
pub async fn run_runbook(
    args: RunArgs,
    ctx: &core_api::AppContext,
) -> Result<i32, core_api::CliError> {
    let doc = load_document(&args.file)?;

    let mut cfg = ctx.cfg().clone();
    if let Some(limit) = args.max_parallel {
        cfg.engine.max_parallel_steps = Some(limit.max(1));
    }
    let ctx = ctx.with_config(cfg);

    let manager = ctx.build_manager(Arc::new(doc.catalog())).await?;
    let total_steps = doc.runbook.steps.len();

    let show_progress = args.progress && atty::is(atty::Stream::Stderr);
    let progress = show_progress.then(|| spawn_progress(manager.subscribe(), total_steps));

    let execution_id = match manager.execute(doc.runbook, args.trigger.clone()).await {
        Ok(id) => id,
        Err(e) => {
            if let Some(handle) = progress {
                handle.abort();
            }
            return Err(e.into());
        }
    };
    eprintln!("execution {execution_id} started");

    let ctrl_c = spawn_ctrl_c(manager.clone(), execution_id.clone());
    let controls = args
        .interactive
        .then(|| spawn_stdin_controls(manager.clone(), execution_id.clone()));

    let final_state = manager.wait(&execution_id).await;

    ctrl_c.abort();
    if let Some(handle) = controls {
        handle.abort();
    }
    if let Some(handle) = progress {
        // The terminal status event normally ends the view on its own.
        if tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .is_err()
        {
            tracing::debug!("progress view did not observe terminal event");
        }
    }

    let execution = final_state?;
    print_execution_summary(&execution);
    Ok(exit_code_for_status(execution.status))
}

fn spawn_progress(
    mut rx: broadcast::Receiver<core_api::ExecutionEvent>,
    total_steps: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut view = ProgressView::new(total_steps, true);
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if view.on_event(&event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "progress view lagged behind events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_ctrl_c(manager: ExecutionManager, execution_id: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("cancel requested, stopping running steps...");
        if let Err(e) = manager.cancel(&execution_id).await {
            tracing::warn!(execution_id = %execution_id, error = %e, "cancel failed");
        }
    })
}

fn spawn_stdin_controls(manager: ExecutionManager, execution_id: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        eprintln!("controls: p = pause, r = resume, c = cancel");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "stdin control reader stopped");
                    break;
                }
            };
            let command = line.trim().to_ascii_lowercase();
            let result = match command.as_str() {
                "p" | "pause" => manager.pause(&execution_id).await.map(|ok| ("pause", ok)),
                "r" | "resume" => manager.resume(&execution_id).await.map(|ok| ("resume", ok)),
                "c" | "cancel" => manager.cancel(&execution_id).await.map(|ok| ("cancel", ok)),
                "" => continue,
                other => {
                    eprintln!("unknown control '{other}' (p/r/c)");
                    continue;
                }
            };
            match result {
                Ok((action, true)) => eprintln!("{action}: ok"),
                Ok((action, false)) => eprintln!("{action}: not applicable in current state"),
                Err(e) => eprintln!("control failed: {e}"),
            }
        }
    })
}

fn print_execution_summary(execution: &core_api::RunbookExecution) {
    println!(
        "execution {} ({}): {}",
        execution.id, execution.runbook_id, execution.status
    );
    for step in &execution.steps {
        let mut line = format!("  {:<24} {:<10}", step.step_id, step.status.as_str());
        if step.attempt > 1 {
            line.push_str(&format!(" attempts={}", step.attempt));
        }
        if let Some(ms) = step.duration_ms() {
            line.push_str(&format!(" {ms}ms"));
        }
        if let Some(run_id) = &step.run_id {
            line.push_str(&format!(" run={run_id}"));
        }
        if let Some(err) = &step.error_message {
            line.push_str(&format!(" error={err}"));
        }
        println!("{line}");
    }
    if let Some(err) = &execution.error_message {
        println!("  error: {err}");
    }
}

pub fn validate_runbook(args: ValidateArgs) -> Result<i32, core_api::CliError> {
    let doc = load_document(&args.file)?;
    let mut report = validate(&doc.runbook);

    for step in &doc.runbook.steps {
        if !doc
            .scripts
            .iter()
            .any(|s| s.id == step.executable.script)
        {
            report.errors.push(format!(
                "step '{}' references unknown script '{}'",
                step.id, step.executable.script
            ));
        }
    }

    if report.is_valid() {
        println!(
            "{}: ok ({} steps, {} scripts)",
            args.file.display(),
            doc.runbook.steps.len(),
            doc.scripts.len()
        );
        return Ok(0);
    }
    for err in &report.errors {
        println!("{}: {err}", args.file.display());
    }
    Ok(12)
}

pub async fn show_execution(
    args: ShowArgs,
    ctx: &core_api::AppContext,
) -> Result<i32, core_api::CliError> {
    let store = ctx.build_services().await?.store;
    let execution = store
        .get_execution(&args.execution_id)
        .await?
        .ok_or_else(|| core_api::ExecutorError::ExecutionNotFound(args.execution_id.clone()))?;

    let rendered = serde_json::to_string_pretty(&execution)
        .map_err(|e| core_api::CliError::Command(format!("render execution failed: {e}")))?;
    println!("{rendered}");

    if args.runs {
        for step in &execution.steps {
            let Some(run_id) = step.run_id.as_deref() else {
                continue;
            };
            if let Some(run) = store.get_run(run_id).await? {
                let rendered = serde_json::to_string(&run).map_err(|e| {
                    core_api::CliError::Command(format!("render run failed: {e}"))
                })?;
                println!("{rendered}");
            }
        }
    }
    Ok(0)
}

pub async fn fingerprint_stderr(args: FingerprintArgs) -> Result<i32, core_api::CliError> {
    let stderr = match args.stderr_file.as_ref() {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    println!("{}", core_api::fingerprint(args.exit_code, &stderr));
    Ok(0)
}

pub async fn list_failures(
    args: FailuresArgs,
    ctx: &core_api::AppContext,
) -> Result<i32, core_api::CliError> {
    let store = ctx.build_services().await?.store;
    let runs = store.runs_by_fingerprint(&args.fingerprint).await?;

    if args.json {
        for run in &runs {
            let rendered = serde_json::to_string(run)
                .map_err(|e| core_api::CliError::Command(format!("render run failed: {e}")))?;
            println!("{rendered}");
        }
        return Ok(0);
    }

    if runs.is_empty() {
        println!("no runs recorded for fingerprint {}", args.fingerprint);
        return Ok(0);
    }
    println!("{} run(s) with fingerprint {}", runs.len(), args.fingerprint);
    for run in &runs {
        println!(
            "  {}  {}  {}  exit={}  {}",
            run.ended_at.to_rfc3339(),
            run.run_id,
            run.script_id,
            run.exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".into()),
            run.stderr_preview.as_deref().unwrap_or("")
        );
    }
    Ok(0)
}
