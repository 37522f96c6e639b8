//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `opsbook_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, load_from_path, AppConfig, EngineConfig, EventsOutConfig, FileStoreConfig,
    LoggingConfig, RunsConfig, StoreConfig, StoreProvider,
};
pub use crate::context::{AppContext, Services, ServicesFactory};
pub use crate::error::{
    CliError, DocumentError, ExecutorError, RunnerError, ScriptError, StoreError,
};
pub use crate::events_out::{EventsOutSink, EventsOutTx};
pub use crate::executor::{ExecutionManager, ExecutionManagerBuilder};
pub use crate::fingerprint::{fingerprint, normalize_stderr};
pub use crate::notify::{BroadcastSink, NotificationSink, SinkSet};
pub use crate::runbook::{
    load_document, validate, Backoff, RetryPolicy, Runbook, RunbookDocument, RunbookStep,
    ScriptRef, StepCondition, ValidationReport,
};
pub use crate::runner::{
    CancelReason, CancelSignal, CancelSource, LaunchOutcome, LaunchSpec, LineStream, LineTap,
    ProcessLauncher,
};
pub use crate::script::{
    Artifact, Profile, RunStatus, RunSummary, ScriptCatalog, ScriptDefinition, ScriptService,
    StaticScriptCatalog,
};
pub use crate::state::{
    ExecutionEvent, ExecutionStatus, RunbookExecution, StepExecution, StepStatus,
};
pub use crate::store::{ExecutionStore, MemoryStore};
