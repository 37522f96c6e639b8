//! Execution and step records, their status machines and change events.

pub mod events;
pub mod transitions;
pub mod types;

pub use events::ExecutionEvent;
pub use transitions::{classify, StateTransition, TransitionError};
pub use types::{ExecutionStatus, RunbookExecution, StepExecution, StepStatus};
