//! Process launching contract: launch specs, outcomes, line streaming and cancellation.

pub mod args;
pub mod cancel;
pub mod interpreter;
pub mod io_pump;
pub mod traits;
pub mod types;

pub use cancel::{CancelReason, CancelSignal, CancelSource, LinkedCancel};
pub use interpreter::{resolve_command, ResolvedCommand};
pub use io_pump::{pump_stderr, pump_stdout, LineStream, LineTap};
pub use traits::ProcessLauncher;
pub use types::{LaunchOutcome, LaunchSpec};
