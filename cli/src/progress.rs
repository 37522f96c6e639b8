use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use opsbook_core::state::{ExecutionEvent, ExecutionStatus, StepStatus};

/// Terminal progress for one execution, driven by its event stream.
///
/// One overall bar counts settled steps; each running step gets a spinner.
pub struct ProgressView {
    multi: MultiProgress,
    overall: ProgressBar,
    step_bars: HashMap<String, ProgressBar>,
    enabled: bool,
}

impl ProgressView {
    pub fn new(total_steps: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                step_bars: HashMap::new(),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_steps as u64));
        overall.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} steps {msg}")
                .expect("overall progress template is valid")
                .progress_chars("█▓▒░  "),
        );
        overall.set_message("starting");

        Self {
            multi,
            overall,
            step_bars: HashMap::new(),
            enabled: true,
        }
    }

    /// Apply one event. Returns true once the execution reached a terminal status.
    pub fn on_event(&mut self, event: &ExecutionEvent) -> bool {
        match event {
            ExecutionEvent::StepStatusChanged {
                step_id,
                status: StepStatus::Running,
                attempt,
                ..
            } => {
                self.step_running(step_id, *attempt);
                false
            }
            ExecutionEvent::StepCompleted {
                step_id,
                status,
                duration_ms,
                error_message,
                ..
            } => {
                self.step_settled(step_id, *status, *duration_ms, error_message.as_deref());
                false
            }
            ExecutionEvent::ExecutionStatusChanged { new_status, .. } => {
                if new_status.is_terminal() {
                    self.finish(*new_status);
                    true
                } else {
                    self.set_message(new_status.as_str());
                    false
                }
            }
            _ => false,
        }
    }

    fn step_running(&mut self, step_id: &str, attempt: u32) {
        if !self.enabled {
            return;
        }
        let label = if attempt > 1 {
            format!("{step_id} (attempt {attempt})")
        } else {
            step_id.to_string()
        };
        if let Some(bar) = self.step_bars.get(step_id) {
            bar.set_message(label);
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.green} {msg}")
                .expect("step spinner template is valid")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.set_message(label);
        bar.enable_steady_tick(Duration::from_millis(100));
        self.step_bars.insert(step_id.to_string(), bar);
    }

    fn step_settled(
        &mut self,
        step_id: &str,
        status: StepStatus,
        duration_ms: Option<i64>,
        error: Option<&str>,
    ) {
        if !self.enabled {
            return;
        }
        let icon = match status {
            StepStatus::Succeeded => "✅",
            StepStatus::Skipped => "⏭",
            _ => "❌",
        };
        let mut line = format!("{icon} {step_id}");
        if let Some(ms) = duration_ms {
            line.push_str(&format!(" ({ms}ms)"));
        }
        if let Some(err) = error.filter(|_| status == StepStatus::Failed) {
            line.push_str(&format!(": {err}"));
        }

        match self.step_bars.remove(step_id) {
            Some(bar) => bar.finish_with_message(line),
            // Skipped steps never ran, so they have no spinner yet.
            None => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("  {msg}")
                        .expect("step line template is valid"),
                );
                bar.finish_with_message(line);
            }
        }
        self.overall.inc(1);
    }

    pub fn set_message(&self, msg: &str) {
        if self.enabled {
            self.overall.set_message(msg.to_string());
        }
    }

    pub fn finish(&self, status: ExecutionStatus) {
        if !self.enabled {
            return;
        }
        let icon = match status {
            ExecutionStatus::Succeeded => "✅",
            ExecutionStatus::PartialSuccess => "⚠",
            _ => "❌",
        };
        self.overall.finish_with_message(format!("{icon} {status}"));
    }
}

impl Drop for ProgressView {
    fn drop(&mut self) {
        for (_, bar) in self.step_bars.drain() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn running(step: &str, attempt: u32) -> ExecutionEvent {
        ExecutionEvent::StepStatusChanged {
            execution_id: "e".into(),
            step_id: step.into(),
            status: StepStatus::Running,
            attempt,
            timestamp: Utc::now(),
        }
    }

    fn completed(step: &str, status: StepStatus) -> ExecutionEvent {
        ExecutionEvent::StepCompleted {
            execution_id: "e".into(),
            step_id: step.into(),
            status,
            attempt: 1,
            run_id: None,
            duration_ms: Some(12),
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    fn status(new_status: ExecutionStatus) -> ExecutionEvent {
        ExecutionEvent::ExecutionStatusChanged {
            execution_id: "e".into(),
            old_status: ExecutionStatus::Running,
            new_status,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn disabled_view_ignores_events_but_reports_terminal() {
        let mut view = ProgressView::new(2, false);
        assert!(!view.on_event(&running("a", 1)));
        assert!(!view.on_event(&completed("a", StepStatus::Succeeded)));
        assert!(view.on_event(&status(ExecutionStatus::Failed)));
    }

    #[test]
    fn enabled_view_tracks_steps() {
        let mut view = ProgressView::new(3, true);
        view.on_event(&running("a", 1));
        view.on_event(&running("a", 2));
        assert_eq!(view.step_bars.len(), 1);

        view.on_event(&completed("a", StepStatus::Succeeded));
        view.on_event(&completed("b", StepStatus::Skipped));
        assert!(view.step_bars.is_empty());
        assert_eq!(view.overall.position(), 2);

        assert!(!view.on_event(&status(ExecutionStatus::Paused)));
        assert!(view.on_event(&status(ExecutionStatus::PartialSuccess)));
    }
}
