//! Runbook data model, skip conditions, retry policies and validation.

pub mod condition;
pub mod document;
pub mod graph;
pub mod model;
pub mod retry;

pub use condition::{ConditionParseError, StepCondition};
pub use document::{load_document, RunbookDocument};
pub use graph::{validate, StepGraph, ValidationReport};
pub use model::{Runbook, RunbookStep, ScriptRef};
pub use retry::{Backoff, RetryPolicy};
