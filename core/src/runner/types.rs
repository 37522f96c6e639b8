use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One script invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub script: PathBuf,
    /// Single argument string, split shell-style by the launcher.
    pub args: String,
    pub working_dir: Option<PathBuf>,
    /// Overlaid on the inherited environment.
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOutcome {
    /// `None` when the run was canceled or the process died from a signal.
    pub exit_code: Option<i32>,
    pub was_canceled: bool,
    pub command_line: String,
}

impl LaunchOutcome {
    pub fn exited(exit_code: i32, command_line: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            was_canceled: false,
            command_line: command_line.into(),
        }
    }

    pub fn canceled(command_line: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            was_canceled: true,
            command_line: command_line.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.was_canceled && self.exit_code == Some(0)
    }
}
