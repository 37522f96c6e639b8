//! Script execution: profile resolution, run directories, artifact capture
//! and run summaries.

pub mod artifacts;
pub mod catalog;
pub mod service;
pub mod types;

pub use artifacts::{media_type_for, scan_artifacts};
pub use catalog::{ScriptCatalog, StaticScriptCatalog};
pub use service::{ScriptService, RUN_DIR_ENV, RUN_ID_ENV, PROFILE_ID_ENV, PROFILE_NAME_ENV};
pub use types::{Artifact, Profile, RunStatus, RunSummary, ScriptDefinition};
