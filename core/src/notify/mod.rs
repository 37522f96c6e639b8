//! Best-effort observers of execution events.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::state::ExecutionEvent;

/// Receives events after they are durable. Must not block.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    fn notify(&self, event: &ExecutionEvent);
}

/// In-process fan-out over a broadcast channel. Lagging receivers lose events.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn notify(&self, event: &ExecutionEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
    }
}

/// Delivers each event to every registered sink in order.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for SinkSet {
    fn name(&self) -> &str {
        "sink-set"
    }

    fn notify(&self, event: &ExecutionEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}
