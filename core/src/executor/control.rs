use tokio::sync::watch;

use crate::runner::{CancelReason, CancelSignal, CancelSource};

/// Pause and cancel switches for one execution.
#[derive(Debug)]
pub struct ExecutionControl {
    cancel: CancelSource,
    pause: watch::Sender<bool>,
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionControl {
    pub fn new() -> Self {
        let (pause, _) = watch::channel(false);
        Self {
            cancel: CancelSource::new(),
            pause,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel(CancelReason::Requested);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.signal()
    }

    pub fn pause(&self) {
        self.pause.send_replace(true);
    }

    pub fn resume(&self) {
        self.pause.send_replace(false);
    }

    pub fn pause_gate(&self) -> PauseGate {
        PauseGate {
            rx: self.pause.subscribe(),
        }
    }
}

/// Observer side of the pause switch.
#[derive(Debug, Clone)]
pub struct PauseGate {
    rx: watch::Receiver<bool>,
}

impl PauseGate {
    pub fn is_paused(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns as soon as the switch is off. Wakes on resume, no polling.
    pub async fn wait_resumed(&mut self) {
        loop {
            if !*self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
