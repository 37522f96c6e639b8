use std::collections::HashMap;

use async_trait::async_trait;

use super::types::ScriptDefinition;

/// Lookup of script definitions by id.
#[async_trait]
pub trait ScriptCatalog: Send + Sync {
    async fn get_script(&self, script_id: &str) -> Option<ScriptDefinition>;
}

/// Catalog over a fixed set of definitions, e.g. those declared in a runbook file.
#[derive(Debug, Clone, Default)]
pub struct StaticScriptCatalog {
    scripts: HashMap<String, ScriptDefinition>,
}

impl StaticScriptCatalog {
    pub fn new(scripts: impl IntoIterator<Item = ScriptDefinition>) -> Self {
        Self {
            scripts: scripts.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn insert(&mut self, script: ScriptDefinition) {
        self.scripts.insert(script.id.clone(), script);
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

#[async_trait]
impl ScriptCatalog for StaticScriptCatalog {
    async fn get_script(&self, script_id: &str) -> Option<ScriptDefinition> {
        self.scripts.get(script_id).cloned()
    }
}
