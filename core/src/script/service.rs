use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::error::ScriptError;
use crate::fingerprint::fingerprint;
use crate::runbook::ScriptRef;
use crate::runner::{resolve_command, CancelSignal, LaunchSpec, LineTap, ProcessLauncher};
use crate::store::ExecutionStore;

use super::artifacts::scan_artifacts;
use super::catalog::ScriptCatalog;
use super::types::{RunStatus, RunSummary};

pub const RUN_ID_ENV: &str = "OPSBOOK_RUN_ID";
pub const RUN_DIR_ENV: &str = "OPSBOOK_RUN_DIR";
pub const PROFILE_ID_ENV: &str = "OPSBOOK_PROFILE_ID";
pub const PROFILE_NAME_ENV: &str = "OPSBOOK_PROFILE_NAME";

const PREVIEW_CHARS: usize = 200;

/// Runs one script invocation end to end and records its [`RunSummary`].
pub struct ScriptService {
    catalog: Arc<dyn ScriptCatalog>,
    launcher: Arc<dyn ProcessLauncher>,
    store: Arc<dyn ExecutionStore>,
    runs_dir: PathBuf,
    line_channel_capacity: usize,
}

#[derive(Debug, Default)]
struct OutputCapture {
    stdout_lines: u64,
    stderr_lines: u64,
    stderr: String,
    last_stdout: Option<String>,
    last_stderr: Option<String>,
}

impl ScriptService {
    pub fn new(
        catalog: Arc<dyn ScriptCatalog>,
        launcher: Arc<dyn ProcessLauncher>,
        store: Arc<dyn ExecutionStore>,
        runs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            launcher,
            store,
            runs_dir: runs_dir.into(),
            line_channel_capacity: 1024,
        }
    }

    pub fn with_line_channel_capacity(mut self, capacity: usize) -> Self {
        self.line_channel_capacity = capacity.max(1);
        self
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Execute the referenced script once.
    ///
    /// Returns the persisted summary for every run that reached the launcher,
    /// whatever its outcome. A launch failure is persisted as a `Failed`
    /// summary and then returned as [`ScriptError::Launch`].
    pub async fn execute(
        &self,
        executable: &ScriptRef,
        cancel: CancelSignal,
    ) -> Result<RunSummary, ScriptError> {
        let script = self
            .catalog
            .get_script(&executable.script)
            .await
            .ok_or_else(|| ScriptError::UnknownScript(executable.script.clone()))?;

        let profile = script.resolve_profile(executable.profile.as_deref());
        let args = executable
            .args
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| profile.args.clone());
        let working_dir = script.resolve_working_dir(&profile);

        let run_id = uuid::Uuid::new_v4().to_string();
        let run_dir = self.runs_dir.join(&run_id);
        tokio::fs::create_dir_all(&run_dir).await?;

        let mut env = BTreeMap::new();
        env.insert(RUN_ID_ENV.to_string(), run_id.clone());
        env.insert(
            RUN_DIR_ENV.to_string(),
            run_dir.to_string_lossy().to_string(),
        );
        env.insert(PROFILE_ID_ENV.to_string(), profile.id.clone());
        env.insert(PROFILE_NAME_ENV.to_string(), profile.name.clone());
        // Profile overrides win over the identity variables.
        env.extend(profile.env.clone());

        let spec = LaunchSpec {
            script: script.path.clone(),
            args: args.clone(),
            working_dir: Some(working_dir.clone()),
            env: env.clone(),
        };
        let planned_command = resolve_command(&spec.script, &spec.args).command_line();

        tracing::info!(
            run_id = %run_id,
            script_id = %script.id,
            profile_id = %profile.id,
            command = %planned_command,
            "script run starting"
        );

        let started_at = Utc::now();
        let clock = Instant::now();
        let (line_tx, line_rx) = mpsc::channel::<LineTap>(self.line_channel_capacity);
        let (launched, capture) = tokio::join!(
            self.launcher.run(&spec, line_tx, cancel),
            collect_output(&run_id, line_rx)
        );
        let duration_ms = clock.elapsed().as_millis() as u64;
        let ended_at = Utc::now();

        let scan_id = run_id.clone();
        let scan_dir = run_dir.clone();
        let artifacts =
            match tokio::task::spawn_blocking(move || scan_artifacts(&scan_id, &scan_dir)).await {
                Ok(Ok(found)) => found,
                Ok(Err(e)) => {
                    tracing::warn!(run_id = %run_id, error = %e, "artifact scan failed");
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "artifact scan task failed");
                    Vec::new()
                }
            };

        let (status, exit_code, failure_fingerprint, error_message, command_line) =
            match &launched {
                Ok(outcome) if outcome.was_canceled => (
                    RunStatus::Canceled,
                    None,
                    None,
                    None,
                    outcome.command_line.clone(),
                ),
                Ok(outcome) if outcome.exit_code == Some(0) => (
                    RunStatus::Succeeded,
                    Some(0),
                    None,
                    None,
                    outcome.command_line.clone(),
                ),
                Ok(outcome) => (
                    RunStatus::Failed,
                    outcome.exit_code,
                    Some(fingerprint(outcome.exit_code, &capture.stderr)),
                    None,
                    outcome.command_line.clone(),
                ),
                Err(e) => (
                    RunStatus::Failed,
                    None,
                    None,
                    Some(e.to_string()),
                    planned_command,
                ),
            };

        let summary = RunSummary {
            run_id: run_id.clone(),
            script_id: script.id.clone(),
            status,
            started_at,
            ended_at,
            duration_ms,
            stdout_lines: capture.stdout_lines,
            stderr_lines: capture.stderr_lines,
            exit_code,
            failure_fingerprint,
            stderr_preview: capture.last_stderr.as_deref().map(preview),
            stdout_preview: capture.last_stdout.as_deref().map(preview),
            artifact_count: artifacts.len(),
            command_line,
            working_dir,
            run_dir,
            profile_id: profile.id.clone(),
            profile_name: profile.name.clone(),
            args,
            env_overrides: env,
            error_message,
        };

        self.store.append_run(&summary).await?;
        if !artifacts.is_empty() {
            self.store.append_artifacts(&artifacts).await?;
        }

        tracing::info!(
            run_id = %summary.run_id,
            status = ?summary.status,
            exit_code = ?summary.exit_code,
            duration_ms = summary.duration_ms,
            artifacts = summary.artifact_count,
            "script run finished"
        );

        launched?;
        Ok(summary)
    }
}

async fn collect_output(run_id: &str, mut rx: mpsc::Receiver<LineTap>) -> OutputCapture {
    let mut capture = OutputCapture::default();
    while let Some(tap) = rx.recv().await {
        tracing::trace!(run_id = %run_id, stream = ?tap.stream, line = %tap.line);
        if tap.stream.is_stderr() {
            capture.stderr_lines += 1;
            capture.stderr.push_str(&tap.line);
            capture.stderr.push('\n');
            if !tap.line.trim().is_empty() {
                capture.last_stderr = Some(tap.line);
            }
        } else {
            capture.stdout_lines += 1;
            if !tap.line.trim().is_empty() {
                capture.last_stdout = Some(tap.line);
            }
        }
    }
    capture
}

fn preview(line: &str) -> String {
    line.trim_end().chars().take(PREVIEW_CHARS).collect()
}
