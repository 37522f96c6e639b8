#[allow(clippy::module_inception)]
pub mod document;
pub mod error;
pub mod executor;
pub mod script;
pub mod store;

pub use document::DocumentError;
pub use error::{CliError, RunnerError};
pub use executor::ExecutorError;
pub use script::ScriptError;
pub use store::StoreError;
