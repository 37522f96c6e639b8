//! JSON-lines mirror of execution events (file or `stdout:`).

pub mod writer;

pub use crate::config::EventsOutConfig;
pub use writer::{start_events_out, EventsOutSink, EventsOutTx};
