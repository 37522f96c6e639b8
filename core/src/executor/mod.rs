//! Runbook execution: per-execution control, the single-writer record,
//! the step executor and the DAG coordinator, fronted by [`ExecutionManager`].

pub mod control;
pub mod coordinator;
pub mod manager;
pub mod record;
pub mod step;

pub use control::{ExecutionControl, PauseGate};
pub use coordinator::Coordinator;
pub use manager::{ExecutionManager, ExecutionManagerBuilder};
pub use record::ExecutionRecord;
pub use step::StepExecutor;
