use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::script::{ScriptDefinition, StaticScriptCatalog};

use super::model::Runbook;

/// A runbook file: the DAG plus the scripts its steps refer to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookDocument {
    #[serde(flatten)]
    pub runbook: Runbook,
    #[serde(default)]
    pub scripts: Vec<ScriptDefinition>,
}

impl RunbookDocument {
    pub fn parse(text: &str, path: &Path) -> Result<Self, DocumentError> {
        let doc: RunbookDocument = toml::from_str(text).map_err(|source| DocumentError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut seen = HashSet::new();
        for script in &doc.scripts {
            if !seen.insert(script.id.as_str()) {
                return Err(DocumentError::DuplicateScript(script.id.clone()));
            }
        }
        Ok(doc)
    }

    /// Rebase relative script paths and working directories onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for script in &mut self.scripts {
            if script.path.is_relative() {
                script.path = base.join(&script.path);
            }
            if let Some(dir) = script.working_dir.as_mut() {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
            for profile in &mut script.profiles {
                if let Some(dir) = profile.working_dir.as_mut() {
                    if dir.is_relative() {
                        *dir = base.join(&*dir);
                    }
                }
            }
        }
    }

    pub fn catalog(&self) -> StaticScriptCatalog {
        StaticScriptCatalog::new(self.scripts.iter().cloned())
    }
}

/// Read and parse a runbook document; relative paths resolve against the
/// document's directory.
pub fn load_document(path: &Path) -> Result<RunbookDocument, DocumentError> {
    let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut doc = RunbookDocument::parse(&text, path)?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    doc.resolve_paths(base);
    tracing::debug!(
        path = %path.display(),
        runbook_id = %doc.runbook.id,
        steps = doc.runbook.steps.len(),
        scripts = doc.scripts.len(),
        "runbook document loaded"
    );
    Ok(doc)
}
