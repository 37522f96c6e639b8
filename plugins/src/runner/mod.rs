pub mod process;

pub use process::TokioProcessLauncher;
