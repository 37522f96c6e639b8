use std::path::PathBuf;

use thiserror::Error;

use super::document::DocumentError;
use super::executor::ExecutorError;
use super::store::StoreError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("executor failed: {0}")]
    Executor(#[from] ExecutorError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("runbook error: {0}")]
    Runbook(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
    #[error("kill failed: {0}")]
    Kill(String),
}
