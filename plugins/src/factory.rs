use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use opsbook_core::config::{AppConfig, StoreProvider};
use opsbook_core::notify::NotificationSink;
use opsbook_core::runner::ProcessLauncher;
use opsbook_core::store::{ExecutionStore, MemoryStore};

use crate::notify::TracingSink;
use crate::runner::TokioProcessLauncher;
use crate::store::JsonFileStore;

/// Expand `~` and `$VARS` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!(path = raw, error = %e, "path expansion failed, using it verbatim");
            PathBuf::from(raw)
        }
    }
}

/// Expand every user-facing path in `cfg` in place.
pub fn expand_config_paths(cfg: &mut AppConfig) {
    if let Some(dir) = cfg.runs.base_dir.as_mut() {
        *dir = expand_path(dir).to_string_lossy().to_string();
    }
    if let StoreProvider::File(file) = &mut cfg.store.provider {
        if let Some(dir) = file.dir.as_mut() {
            *dir = expand_path(dir).to_string_lossy().to_string();
        }
    }
    if let Some(dir) = cfg.logging.directory.as_mut() {
        *dir = expand_path(dir).to_string_lossy().to_string();
    }
    if !cfg.events_out.path.starts_with("stdout:") {
        cfg.events_out.path = expand_path(&cfg.events_out.path)
            .to_string_lossy()
            .to_string();
    }
}

pub async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn ExecutionStore>> {
    match &cfg.store.provider {
        StoreProvider::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreProvider::File(file) => {
            let dir = file
                .dir
                .as_deref()
                .map(expand_path)
                .unwrap_or_else(|| PathBuf::from("./store"));
            let store = JsonFileStore::open(&dir)
                .await
                .with_context(|| format!("failed to open file store at {}", dir.display()))?;
            Ok(Arc::new(store))
        }
    }
}

pub fn build_launcher(cfg: &AppConfig) -> Arc<dyn ProcessLauncher> {
    Arc::new(TokioProcessLauncher::new(Duration::from_millis(
        cfg.engine.kill_grace_ms,
    )))
}

pub fn build_sinks(_cfg: &AppConfig) -> Vec<Arc<dyn NotificationSink>> {
    vec![Arc::new(TracingSink)]
}
