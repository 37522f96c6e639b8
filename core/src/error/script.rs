use thiserror::Error;

use super::error::RunnerError;
use super::store::StoreError;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("unknown script: {0}")]
    UnknownScript(String),
    #[error("launch failed: {0}")]
    Launch(#[from] RunnerError),
    #[error("run directory error: {0}")]
    RunDir(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
