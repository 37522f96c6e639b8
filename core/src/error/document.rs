use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("failed to read runbook {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse runbook {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("duplicate script id in runbook document: {0}")]
    DuplicateScript(String),
}
