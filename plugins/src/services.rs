//! ServicesFactory implementation: builds store, launcher and sinks from config for the CLI.
use async_trait::async_trait;
use opsbook_core::api::{AppConfig, CliError, Services, ServicesFactory};

use crate::factory;

#[derive(Default)]
pub struct PluginServicesFactory;

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, CliError> {
        let store = factory::build_store(cfg).await?;
        let launcher = factory::build_launcher(cfg);
        let sinks = factory::build_sinks(cfg);
        tracing::debug!(
            store = store.name(),
            launcher = launcher.name(),
            sinks = sinks.len(),
            "services built"
        );
        Ok(Services {
            store,
            launcher,
            sinks,
        })
    }
}
