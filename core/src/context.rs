use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::CliError;
use crate::events_out::{start_events_out, EventsOutSink, EventsOutTx};
use crate::executor::ExecutionManager;
use crate::notify::NotificationSink;
use crate::runner::ProcessLauncher;
use crate::script::{ScriptCatalog, ScriptService};
use crate::store::ExecutionStore;

/// Backends an [`ExecutionManager`] is assembled from.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ExecutionStore>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub sinks: Vec<Arc<dyn NotificationSink>>,
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, CliError>;
}

#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    events_out: Option<EventsOutTx>,
    services_factory: Option<Arc<dyn ServicesFactory>>,
}

impl AppContext {
    pub async fn new(
        cfg: AppConfig,
        services_factory: Option<Arc<dyn ServicesFactory>>,
    ) -> Result<Self, CliError> {
        let events_out = start_events_out(&cfg.events_out)
            .await
            .map_err(CliError::Config)?;
        Ok(Self {
            cfg,
            events_out,
            services_factory,
        })
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn events_out(&self) -> Option<EventsOutTx> {
        self.events_out.clone()
    }

    pub fn with_config(&self, cfg: AppConfig) -> Self {
        Self {
            cfg,
            events_out: self.events_out.clone(),
            services_factory: self.services_factory.clone(),
        }
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.cfg
            .runs
            .base_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./runs"))
    }

    pub async fn build_services(&self) -> Result<Services, CliError> {
        let Some(factory) = self.services_factory.as_ref() else {
            return Err(CliError::Config(
                "services_factory missing (cannot build store/launcher)".into(),
            ));
        };
        factory.build_services(&self.cfg).await
    }

    /// Wire a manager for scripts resolved through `catalog`.
    pub async fn build_manager(
        &self,
        catalog: Arc<dyn ScriptCatalog>,
    ) -> Result<ExecutionManager, CliError> {
        let services = self.build_services().await?;
        let engine = &self.cfg.engine;

        let scripts = ScriptService::new(
            catalog,
            services.launcher,
            services.store.clone(),
            self.runs_dir(),
        )
        .with_line_channel_capacity(engine.line_channel_capacity);

        let mut builder = ExecutionManager::builder(services.store, Arc::new(scripts))
            .event_capacity(engine.event_channel_capacity)
            .max_parallel_steps(engine.max_parallel_steps);
        for sink in services.sinks {
            builder = builder.sink(sink);
        }
        if let Some(out) = self.events_out() {
            builder = builder.sink(Arc::new(EventsOutSink::new(out)));
        }

        tracing::debug!(
            runs_dir = %self.runs_dir().display(),
            max_parallel_steps = ?engine.max_parallel_steps,
            "execution manager assembled"
        );
        Ok(builder.build())
    }
}
