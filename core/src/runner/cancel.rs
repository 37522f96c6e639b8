use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Someone asked for the work to stop.
    Requested,
    /// A deadline linked into the signal elapsed.
    TimedOut,
}

/// Owning side of a cancellation signal. Cancelling is idempotent; the first
/// reason wins.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<Option<CancelReason>>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self, reason: CancelReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Cloneable observer side of a [`CancelSource`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<Option<CancelReason>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.rx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once cancelled. Pends forever if the source is dropped
    /// without cancelling.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Child signal that fires when this one fires or `timeout` elapses.
    ///
    /// The returned guard must be kept alive for as long as the child is used.
    pub fn linked(&self, timeout: Option<Duration>) -> LinkedCancel {
        let child = CancelSource::new();
        if let Some(reason) = self.reason() {
            child.cancel(reason);
        }
        let signal = child.signal();

        let parent = self.clone();
        let watcher = tokio::spawn(async move {
            match timeout {
                Some(limit) => {
                    tokio::select! {
                        reason = parent.cancelled() => child.cancel(reason),
                        _ = tokio::time::sleep(limit) => child.cancel(CancelReason::TimedOut),
                    }
                }
                None => {
                    let reason = parent.cancelled().await;
                    child.cancel(reason);
                }
            }
            // Keep the sender alive so receivers never observe a closed channel.
            std::future::pending::<()>().await;
        });

        LinkedCancel { signal, watcher }
    }
}

/// Guard for a signal produced by [`CancelSignal::linked`].
#[derive(Debug)]
pub struct LinkedCancel {
    signal: CancelSignal,
    watcher: JoinHandle<()>,
}

impl LinkedCancel {
    pub fn signal(&self) -> CancelSignal {
        self.signal.clone()
    }
}

impl Drop for LinkedCancel {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
