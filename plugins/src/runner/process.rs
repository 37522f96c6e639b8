use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Pid, System};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use opsbook_core::error::RunnerError;
use opsbook_core::runner::{
    pump_stderr, pump_stdout, resolve_command, CancelSignal, LaunchOutcome, LaunchSpec, LineTap,
    ProcessLauncher,
};

/// Launches scripts as OS processes through their interpreter.
///
/// On cancel every descendant is killed before the root so that orphaned
/// grandchildren cannot keep running or hold the output pipes open.
pub struct TokioProcessLauncher {
    kill_grace: Duration,
}

impl TokioProcessLauncher {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }
}

impl Default for TokioProcessLauncher {
    fn default() -> Self {
        Self::new(Duration::from_millis(2_000))
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(
        &self,
        spec: &LaunchSpec,
        line_tx: mpsc::Sender<LineTap>,
        cancel: CancelSignal,
    ) -> Result<LaunchOutcome, RunnerError> {
        if !spec.script.is_file() {
            return Err(RunnerError::ScriptNotFound(spec.script.clone()));
        }

        let resolved = resolve_command(&spec.script, &spec.args);
        let command_line = resolved.command_line();
        if cancel.is_cancelled() {
            return Ok(LaunchOutcome::canceled(command_line));
        }

        let mut cmd = Command::new(&resolved.program);
        cmd.args(&resolved.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = spec.working_dir.as_ref() {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RunnerError::Spawn(format!("{}: {e}", resolved.program)))?;
        let pid = child.id();
        tracing::debug!(pid = ?pid, command = %command_line, "process spawned");

        let mut pumps: Vec<JoinHandle<Result<u64, RunnerError>>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump_stdout(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump_stderr(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let outcome = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| RunnerError::Spawn(format!("wait failed: {e}")))?;
                LaunchOutcome {
                    exit_code: status.code(),
                    was_canceled: false,
                    command_line: command_line.clone(),
                }
            }
            reason = cancel.cancelled() => {
                tracing::info!(pid = ?pid, reason = ?reason, "cancel requested, killing process tree");
                if let Some(root) = pid {
                    match tokio::task::spawn_blocking(move || kill_descendants(root)).await {
                        Ok(killed) => tracing::debug!(pid = root, descendants = killed, "descendants killed"),
                        Err(e) => tracing::warn!(pid = root, error = %e, "descendant kill task failed"),
                    }
                }
                if let Err(e) = child.start_kill() {
                    tracing::warn!(pid = ?pid, error = %e, "kill failed");
                }
                match tokio::time::timeout(self.kill_grace, child.wait()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(pid = ?pid, error = %e, "wait after kill failed"),
                    Err(_) => tracing::warn!(pid = ?pid, grace_ms = self.kill_grace.as_millis() as u64, "process did not exit within kill grace"),
                }
                LaunchOutcome::canceled(command_line.clone())
            }
        };

        for mut pump in pumps {
            match tokio::time::timeout(self.kill_grace, &mut pump).await {
                Ok(Ok(Ok(_))) => {}
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "output pump failed"),
                Ok(Err(e)) => tracing::warn!(error = %e, "output pump task failed"),
                Err(_) => {
                    // A surviving background process still holds the pipe.
                    tracing::warn!(pid = ?pid, "output stream still open after exit, detaching");
                    pump.abort();
                }
            }
        }

        Ok(outcome)
    }
}

/// Kill every live descendant of `root`, deepest first. Returns how many
/// were signalled.
fn kill_descendants(root: u32) -> usize {
    let mut sys = System::new();
    sys.refresh_processes();

    let mut victims: Vec<Pid> = Vec::new();
    let mut frontier = vec![Pid::from_u32(root)];
    while let Some(parent) = frontier.pop() {
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) && !victims.contains(pid) {
                victims.push(*pid);
                frontier.push(*pid);
            }
        }
    }

    victims
        .iter()
        .rev()
        .filter_map(|pid| sys.process(*pid))
        .filter(|process| process.kill())
        .count()
}
