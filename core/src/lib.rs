pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod events_out;
pub mod executor;
pub mod fingerprint;
pub mod notify;
pub mod runbook;
pub mod runner;
pub mod script;
pub mod state;
pub mod store;
