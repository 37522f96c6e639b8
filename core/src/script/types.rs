use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named preset of arguments, environment and working directory for a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Used when a step names no profile.
    #[serde(default)]
    pub default: bool,
}

impl Profile {
    /// Built-in profile used when a script defines none.
    pub fn builtin() -> Self {
        Self {
            id: "default".to_string(),
            name: "Default".to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
    /// Script-level default, used when the profile sets none.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl ScriptDefinition {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            path: path.into(),
            working_dir: None,
            profiles: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Explicit id, then the profile flagged `default`, then the first one,
    /// then [`Profile::builtin`]. An unknown explicit id falls through.
    pub fn resolve_profile(&self, requested: Option<&str>) -> Profile {
        if let Some(id) = requested.filter(|s| !s.trim().is_empty()) {
            if let Some(p) = self.profiles.iter().find(|p| p.id == id) {
                return p.clone();
            }
            tracing::warn!(
                script_id = %self.id,
                profile_id = %id,
                "profile not defined for script, falling back to default"
            );
        }

        self.profiles
            .iter()
            .find(|p| p.default)
            .or_else(|| self.profiles.first())
            .cloned()
            .unwrap_or_else(Profile::builtin)
    }

    /// Profile dir, then script default, then the script's own directory.
    pub fn resolve_working_dir(&self, profile: &Profile) -> PathBuf {
        profile
            .working_dir
            .clone()
            .or_else(|| self.working_dir.clone())
            .or_else(|| self.path.parent().map(Path::to_path_buf))
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Canceled,
}

/// Durable record of exactly what ran and how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub script_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stdout_lines: u64,
    pub stderr_lines: u64,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub failure_fingerprint: Option<String>,
    /// Last stderr line, at most 200 chars.
    #[serde(default)]
    pub stderr_preview: Option<String>,
    /// Last stdout line, at most 200 chars.
    #[serde(default)]
    pub stdout_preview: Option<String>,
    pub artifact_count: usize,
    pub command_line: String,
    pub working_dir: PathBuf,
    pub run_dir: PathBuf,
    pub profile_id: String,
    pub profile_name: String,
    pub args: String,
    pub env_overrides: BTreeMap<String, String>,
    /// Launch failure text when the process never ran.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// One-line reason for a failed run.
    pub fn failure_reason(&self) -> String {
        if let Some(err) = &self.error_message {
            return err.clone();
        }
        match (self.status, self.exit_code, self.stderr_preview.as_deref()) {
            (RunStatus::Canceled, _, _) => "canceled".to_string(),
            (_, Some(code), Some(last)) => format!("exit code {code}: {last}"),
            (_, Some(code), None) => format!("exit code {code}"),
            (_, None, Some(last)) => format!("terminated: {last}"),
            (_, None, None) => "terminated without exit code".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub run_id: String,
    pub media_type: String,
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}
