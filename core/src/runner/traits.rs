use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RunnerError;

use super::cancel::CancelSignal;
use super::io_pump::LineTap;
use super::types::{LaunchOutcome, LaunchSpec};

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    fn name(&self) -> &str;

    /// Run the script to completion, delivering each output line on `line_tx`
    /// as it is produced.
    ///
    /// Cancellation kills the whole process tree and returns
    /// `was_canceled = true`. A missing script file is reported as
    /// [`RunnerError::ScriptNotFound`] before anything is spawned.
    async fn run(
        &self,
        spec: &LaunchSpec,
        line_tx: mpsc::Sender<LineTap>,
        cancel: CancelSignal,
    ) -> Result<LaunchOutcome, RunnerError>;
}
